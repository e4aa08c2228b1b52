//! Cursor classification: which kind of completion fits at a position.

use crate::builder::handle_quotes;
use crate::builder::render::double_quoted;
use crate::logql::lexer::is_terminated_string;
use crate::logql::{parse, tokenize, Node, NodeKind, SyntaxTree, TokenKind};
use crate::query::get_log_query_from_metrics_query;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stream selector matcher operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelOperator {
    /// `=`
    #[serde(rename = "=")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Neq,
    /// `=~`
    #[serde(rename = "=~")]
    Re,
    /// `!~`
    #[serde(rename = "!~")]
    Nre,
}

impl LabelOperator {
    /// Operator as written in LogQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelOperator::Eq => "=",
            LabelOperator::Neq => "!=",
            LabelOperator::Re => "=~",
            LabelOperator::Nre => "!~",
        }
    }

    fn from_kind(kind: NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Eq => Some(LabelOperator::Eq),
            NodeKind::Neq => Some(LabelOperator::Neq),
            NodeKind::Re => Some(LabelOperator::Re),
            NodeKind::Nre => Some(LabelOperator::Nre),
            _ => None,
        }
    }
}

impl fmt::Display for LabelOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete matcher already present in the selector being edited.
///
/// `name` and `value` are never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Unquoted value.
    pub value: String,
    /// Matcher operator.
    pub op: LabelOperator,
}

impl Label {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, op: LabelOperator, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            op,
        }
    }

    /// `name op "value"`, with the value escaped.
    pub fn matcher(&self) -> String {
        format!("{}{}{}", self.name, self.op, double_quoted(&self.value))
    }
}

/// Matchers of a selector joined with `,`, without braces.
pub fn matchers_expr(labels: &[Label]) -> String {
    labels
        .iter()
        .map(Label::matcher)
        .collect::<Vec<_>>()
        .join(",")
}

/// Editing context at the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Situation {
    /// Nothing typed yet.
    Empty,
    /// At the start of an expression.
    AtRoot,
    /// Inside `[...]`.
    InRange,
    /// Inside `{...}` where a label name is expected.
    InLabelSelectorNoLabelName {
        /// Other complete matchers of the selector.
        other_labels: Vec<Label>,
    },
    /// Inside `{...}` after `name op`.
    InLabelSelectorWithLabelName {
        /// Label whose value is being typed.
        label_name: String,
        /// Cursor is inside a string literal.
        between_quotes: bool,
        /// Other complete matchers of the selector.
        other_labels: Vec<Label>,
    },
    /// After a selector or a finished pipeline stage.
    AfterSelector {
        /// Logs part of the query up to the word being typed.
        log_query: String,
        /// Last non-blank character before the word is `|`.
        after_pipe: bool,
        /// Character right before the word is whitespace.
        has_space: bool,
    },
    /// Inside the argument list of a vector aggregation.
    InAggregation,
    /// After the operator of a post-pipe label filter.
    InLabelFilterMatcher {
        /// Logs part of the query up to the cursor.
        log_query: String,
    },
}

/// Classifies the cursor position `cursor` (a byte offset) in `text`.
///
/// Returns `None` when no completion applies. Never fails on malformed
/// input.
pub fn classify(text: &str, cursor: usize) -> Option<Situation> {
    if text.is_empty() {
        return Some(Situation::Empty);
    }

    let cursor = clamp(text, cursor);
    let word_start = word_start(text, cursor);
    if text[..word_start].trim().is_empty() {
        return Some(Situation::AtRoot);
    }

    let tree = parse(text);
    let error = error_at(&tree, cursor);

    if error.is_some_and(|e| {
        e.parent().is_some_and(|p| p.kind() == NodeKind::LogRangeExpr) && e.prev_sibling().is_none()
    }) {
        return Some(Situation::AtRoot);
    }

    if in_range(&tree, text, cursor) {
        return Some(Situation::InRange);
    }

    if let Some(selector) = enclosing_selector(&tree, text, cursor) {
        return in_selector(selector, text, cursor);
    }

    if let Some(situation) = after_selector(text, word_start) {
        return Some(situation);
    }

    if error.is_some_and(|e| {
        e.parent()
            .is_some_and(|p| p.kind() == NodeKind::VectorAggregationExpr)
    }) {
        return Some(Situation::InAggregation);
    }

    in_label_filter(&tree, text, cursor)
}

fn clamp(text: &str, cursor: usize) -> usize {
    let mut cursor = cursor.min(text.len());
    while !text.is_char_boundary(cursor) {
        cursor -= 1;
    }
    cursor
}

fn word_start(text: &str, cursor: usize) -> usize {
    text[..cursor]
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .last()
        .map_or(cursor, |(i, _)| i)
}

fn error_at(tree: &SyntaxTree, cursor: usize) -> Option<Node<'_>> {
    tree.iter()
        .find(|n| n.is_error() && n.from() <= cursor && cursor <= n.to())
}

fn in_range(tree: &SyntaxTree, text: &str, cursor: usize) -> bool {
    tree.find_all(NodeKind::Range).any(|range| {
        range.from() < cursor
            && cursor <= range.to()
            && !text[range.from()..cursor].contains(']')
    })
}

fn enclosing_selector<'t>(tree: &'t SyntaxTree, text: &str, cursor: usize) -> Option<Node<'t>> {
    tree.find_all(NodeKind::Selector)
        .filter(|selector| {
            let unclosed = selector.last_child().is_some_and(|c| c.is_error());
            selector.from() < cursor
                && (cursor < selector.to()
                    || (unclosed && text[selector.to()..cursor].trim().is_empty()))
        })
        .last()
}

fn matcher_op(matcher: Node<'_>) -> Option<Node<'_>> {
    matcher
        .child(NodeKind::Identifier)
        .and_then(|name| name.next_sibling())
        .filter(|op| !op.is_error())
}

fn in_selector(selector: Node<'_>, text: &str, cursor: usize) -> Option<Situation> {
    let matchers: Vec<Node<'_>> = selector
        .child(NodeKind::Matchers)
        .map(|m| m.children().filter(|c| c.kind() == NodeKind::Matcher).collect())
        .unwrap_or_default();

    let current = matchers
        .iter()
        .copied()
        .find(|m| m.from() <= cursor && cursor <= m.to());
    let other_labels: Vec<Label> = matchers
        .iter()
        .copied()
        .filter(|m| Some(*m) != current)
        .filter_map(|m| complete_label(m, text))
        .collect();

    let no_label_name = Situation::InLabelSelectorNoLabelName {
        other_labels: other_labels.clone(),
    };
    let Some(current) = current else {
        return Some(no_label_name);
    };
    if !matcher_op(current).is_some_and(|op| op.from() < cursor) {
        return Some(no_label_name);
    }
    let label_name = current
        .child(NodeKind::Identifier)
        .map(|n| n.text(text).to_string())
        .unwrap_or_default();

    let between_quotes = match current.child(NodeKind::String) {
        Some(value) if cursor >= value.to() && is_terminated_string(value.text(text)) => {
            return None;
        }
        Some(value) => cursor > value.from(),
        None => false,
    };

    Some(Situation::InLabelSelectorWithLabelName {
        label_name,
        between_quotes,
        other_labels,
    })
}

fn complete_label(matcher: Node<'_>, text: &str) -> Option<Label> {
    if matcher.has_error() {
        return None;
    }
    let name = matcher.child(NodeKind::Identifier)?.text(text);
    let op = LabelOperator::from_kind(matcher_op(matcher)?.kind())?;
    let raw = matcher.child(NodeKind::String)?.text(text);
    if !is_terminated_string(raw) {
        return None;
    }
    let value = handle_quotes(raw);
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some(Label::new(name, op, value))
}

fn after_selector(text: &str, word_start: usize) -> Option<Situation> {
    let prefix = &text[..word_start];
    let tokens = tokenize(prefix);
    let last = tokens.last()?;

    let qualifies = match last.kind {
        TokenKind::Pipe => true,
        TokenKind::RBrace => {
            let tree = parse(prefix);
            let closes_selector = tree
                .find_all(NodeKind::Selector)
                .any(|s| s.to() == last.to && !s.has_error());
            closes_selector
        }
        _ => {
            let tree = parse(prefix);
            let ends_stage = tree
                .find_all(NodeKind::PipelineStage)
                .any(|s| s.to() == last.to && !s.has_error());
            ends_stage
        }
    };
    if !qualifies {
        return None;
    }

    Some(Situation::AfterSelector {
        log_query: get_log_query_from_metrics_query(prefix).trim().to_string(),
        after_pipe: prefix.trim_end().ends_with('|'),
        has_space: prefix.chars().last().is_some_and(char::is_whitespace),
    })
}

fn in_label_filter(tree: &SyntaxTree, text: &str, cursor: usize) -> Option<Situation> {
    tree.find_all(NodeKind::LabelFilter)
        .filter_map(|filter| filter.first_child())
        .filter(|m| matches!(m.kind(), NodeKind::Matcher | NodeKind::NumberFilter))
        .find(|m| matcher_op(*m).is_some_and(|op| op.to() <= cursor) && cursor <= m.to())?;

    Some(Situation::InLabelFilterMatcher {
        log_query: get_log_query_from_metrics_query(&text[..cursor])
            .trim()
            .to_string(),
    })
}
