//! LogQL grammar: tokenizer, error-tolerant parser and syntax tree.
//!
//! ```
//! use logql_lens::logql::{parse, NodeKind};
//!
//! let src = r#"{job="mysql"} |= "error""#;
//! let tree = parse(src);
//! let selector = tree.find(NodeKind::Selector).unwrap();
//! assert_eq!(selector.text(src), r#"{job="mysql"}"#);
//! ```

pub mod lexer;
pub mod parser;
pub mod syntax;
pub mod validation;

pub use lexer::{tokenize, Token, TokenKind};
pub use parser::parse;
pub use syntax::{Descendants, Node, NodeKind, SyntaxTree};
pub use validation::{validate_query, Diagnostic};
