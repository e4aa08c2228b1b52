//! Syntax diagnostics for editor integrations.

use super::parser::parse;
use super::syntax::NodeKind;
use crate::builder::variables::interpolate;
use serde::Serialize;

/// A syntax error with a 1-based line/column range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Offending source text.
    pub message: String,
    /// Start byte offset in the source.
    pub from: usize,
    /// End byte offset in the source.
    pub to: usize,
    /// 1-based.
    pub start_line: usize,
    /// 1-based, in characters.
    pub start_column: usize,
    #[allow(missing_docs)]
    pub end_line: usize,
    #[allow(missing_docs)]
    pub end_column: usize,
}

/// Reports one diagnostic per error node.
///
/// Template variables are substituted before parsing so they never produce
/// errors of their own. An empty error node reports its parent's text and
/// span instead.
pub fn validate_query(query: &str) -> Vec<Diagnostic> {
    let interpolated = interpolate(query);
    let tree = parse(&interpolated.text);

    tree.iter()
        .filter(|node| node.is_error())
        .filter(|node| node.parent().map_or(true, |p| p.kind() != NodeKind::Range))
        .map(|node| {
            let target = if node.is_empty() {
                node.parent().unwrap_or(node)
            } else {
                node
            };
            let from = interpolated.original_offset(target.from());
            let to = interpolated.original_offset(target.to()).max(from);
            let (start_line, start_column) = line_column(query, from);
            let (end_line, end_column) = line_column(query, to);
            Diagnostic {
                message: query.get(from..to).unwrap_or("").to_string(),
                from,
                to,
                start_line,
                start_column,
                end_line,
                end_column,
            }
        })
        .collect()
}

/// 1-based line and character column of a byte offset.
fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &text[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}
