//! Structured visual-query model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A query as edited by the visual builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualQuery {
    /// Stream selector matchers.
    pub labels: Vec<LabelFilter>,
    /// Pipeline stages, range/vector aggregations and scalar operations, in
    /// application order.
    pub operations: Vec<Operation>,
    /// Right-hand queries of binary expressions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binary_queries: Vec<BinaryQuery>,
}

impl VisualQuery {
    /// No labels and no operations.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.operations.is_empty()
    }
}

/// One stream selector matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFilter {
    /// Label name.
    pub label: String,
    /// `=`, `!=`, `=~` or `!~`.
    pub op: String,
    /// Unquoted value.
    pub value: String,
}

impl LabelFilter {
    /// Convenience constructor.
    pub fn new(label: impl Into<String>, op: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            op: op.into(),
            value: value.into(),
        }
    }
}

/// One operation, identified by an operation id such as `json`, `rate` or
/// `__line_contains`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation id.
    pub id: String,
    /// Ordered parameters.
    pub params: Vec<ParamValue>,
}

impl Operation {
    /// Convenience constructor.
    pub fn new(id: impl Into<String>, params: Vec<ParamValue>) -> Self {
        Self {
            id: id.into(),
            params,
        }
    }

    /// Parameter `index` rendered as text, `""` when absent.
    pub fn param(&self, index: usize) -> String {
        self.params.get(index).map(ToString::to_string).unwrap_or_default()
    }
}

/// Operation parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    #[allow(missing_docs)]
    String(String),
    #[allow(missing_docs)]
    Number(f64),
    #[allow(missing_docs)]
    Bool(bool),
}

impl ParamValue {
    /// Parses a numeric literal, keeping the text when it is not a number.
    pub fn number(text: &str) -> Self {
        match text.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => ParamValue::Number(n),
            _ => ParamValue::String(text.to_string()),
        }
    }

    /// The boolean value, `false` for other kinds.
    pub fn as_bool(&self) -> bool {
        matches!(self, ParamValue::Bool(true))
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::String(s) => f.write_str(s),
            ParamValue::Bool(b) => write!(f, "{b}"),
            // integral values print without a fraction
            ParamValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{n:.0}"),
            ParamValue::Number(n) => write!(f, "{n}"),
        }
    }
}

/// `on` / `ignoring` vector matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorMatchType {
    #[allow(missing_docs)]
    On,
    #[allow(missing_docs)]
    Ignoring,
}

impl VectorMatchType {
    /// Keyword as written in LogQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorMatchType::On => "on",
            VectorMatchType::Ignoring => "ignoring",
        }
    }
}

/// Right-hand side of a binary expression between two queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryQuery {
    /// Operator text, e.g. `/` or `and`.
    pub operator: String,
    /// `bool` modifier present.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bool_modifier: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub vector_matches_type: Option<VectorMatchType>,
    /// Label list of the `on`/`ignoring` clause, as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_matches: Option<String>,
    /// The nested query.
    pub query: VisualQuery,
}

/// Something the visual builder could not represent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsingError {
    /// Offending text or message.
    pub text: String,
    /// Start offset in the variable-substituted query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,
    /// End offset in the variable-substituted query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<usize>,
    /// Grammar name of the offending node's parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<String>,
}

impl ParsingError {
    /// An error with only a message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            from: None,
            to: None,
            parent_type: None,
        }
    }
}

/// Output of [`crate::builder::build_visual_query`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildResult {
    /// The reconstructed query.
    pub query: VisualQuery,
    /// Unsupported or malformed parts. Empty for an empty query.
    pub errors: Vec<ParsingError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_display() {
        assert_eq!(ParamValue::Number(5.0).to_string(), "5");
        assert_eq!(ParamValue::Number(0.99).to_string(), "0.99");
        assert_eq!(ParamValue::Bool(true).to_string(), "true");
        assert_eq!(ParamValue::from("5m").to_string(), "5m");
    }

    #[test]
    fn test_param_number_parsing() {
        assert_eq!(ParamValue::number("-2"), ParamValue::Number(-2.0));
        assert_eq!(ParamValue::number("1e3"), ParamValue::Number(1000.0));
        assert_eq!(ParamValue::number("x"), ParamValue::String("x".into()));
    }

    #[test]
    fn test_serialization_shape() {
        let query = VisualQuery {
            labels: vec![LabelFilter::new("job", "=", "mysql")],
            operations: vec![Operation::new("logfmt", vec![false.into(), false.into()])],
            binary_queries: vec![],
        };
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "labels": [{"label": "job", "op": "=", "value": "mysql"}],
                "operations": [{"id": "logfmt", "params": [false, false]}]
            })
        );

        let back: VisualQuery = serde_json::from_value(json).unwrap();
        assert_eq!(back, query);
    }
}
