//! Visual query builder.
//!
//! Converts LogQL text into the structured [`VisualQuery`] model used by
//! graphical query editors, and renders that model back to text.
//!
//! ```
//! use logql_lens::builder::{build_visual_query, render_visual_query};
//!
//! let result = build_visual_query(r#"{job="mysql"} |= "error" | json"#);
//! assert!(result.errors.is_empty());
//! assert_eq!(result.query.operations.len(), 2);
//! assert_eq!(
//!     render_visual_query(&result.query),
//!     r#"{job="mysql"} |= `error` | json"#
//! );
//! ```

pub mod model;
pub mod operations;
pub mod parsing;
pub mod render;
pub mod variables;

pub use model::{
    BinaryQuery, BuildResult, LabelFilter, Operation, ParamValue, ParsingError, VectorMatchType,
    VisualQuery,
};
pub use parsing::{build_visual_query, handle_quotes};
pub use render::render_visual_query;
pub use variables::{replace_variables, return_variables};
