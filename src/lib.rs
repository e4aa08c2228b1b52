//! logql-lens - LogQL tooling for Grafana Loki.
//!
//! logql-lens understands LogQL as it is being typed. It answers the
//! questions an editor asks while a user writes a Loki query, and converts
//! queries to and from the structured model used by visual query builders.
//!
//! # Features
//!
//! - **Error-tolerant parsing**: every input yields a syntax tree, with error
//!   nodes where the text is incomplete
//! - **Cursor situations**: what kind of completion fits at a position
//! - **Completion**: keywords, label names and values with data-volume hints,
//!   parser stages and fields detected from sampled log lines
//! - **Visual queries**: LogQL to a structured model and back
//! - **Diagnostics**: line/column ranges for syntax errors
//!
//! # Architecture
//!
//! - `logql`: tokenizer, parser, syntax tree and validation
//! - `query`: pure introspection helpers over a query string
//! - `completion`: situation classifier and completion engine
//! - `builder`: visual-query model, builder and renderer
//! - `backend`: label/stats/sample lookups against Grafana Loki
//! - `core`: configuration and errors
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use logql_lens::backend::GrafanaLokiClient;
//! use logql_lens::completion::CompletionEngine;
//! use logql_lens::core::ConfigBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigBuilder::new()
//!         .base_url("http://localhost:3000")
//!         .datasource_uid("loki")
//!         .build()?;
//!     let engine = CompletionEngine::new(GrafanaLokiClient::new(&config)?, config.completion);
//!     for item in engine.complete_at("{job=", 5).await {
//!         println!("{}", item.insert_text);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod backend;
pub mod builder;
pub mod cli;
pub mod completion;
pub mod core;
pub mod logql;
pub mod query;

// Re-export the main entry points for convenience
pub use crate::builder::{build_visual_query, render_visual_query, BuildResult, VisualQuery};
pub use crate::completion::{classify, CompletionEngine, CompletionItem, Situation};
pub use crate::core::{Config, LensError, Result};
pub use crate::logql::{parse, validate_query};
