//! Cursor-aware LogQL completion.
//!
//! [`classify`] decides what kind of completion fits at a cursor position;
//! [`CompletionEngine`] turns that [`Situation`] into [`CompletionItem`]s,
//! asking a [`LokiBackend`](crate::backend::LokiBackend) for label names,
//! values, sizes and samples where needed.
//!
//! ```
//! use logql_lens::completion::{classify, Situation};
//!
//! let situation = classify(r#"{job="mysql"} | "#, 16);
//! assert!(matches!(situation, Some(Situation::AfterSelector { after_pipe: true, .. })));
//! ```

pub mod engine;
pub mod operations;
pub mod situation;
pub mod size;

use serde::Serialize;

pub use engine::{CancelHandle, CancelToken, CompletionEngine};
pub use situation::{classify, matchers_expr, Label, LabelOperator, Situation};
pub use size::human_file_size;

/// One completion suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionItem {
    /// Text shown in the completion list.
    pub label: String,
    /// Text inserted when the item is accepted.
    pub insert_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub documentation: Option<String>,
    /// Extra information, e.g. how much data carries a label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CompletionItem {
    /// An item with no documentation or detail.
    pub fn new(label: impl Into<String>, insert_text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            insert_text: insert_text.into(),
            documentation: None,
            detail: None,
        }
    }
}
