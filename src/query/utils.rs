//! Introspection helpers over LogQL text.
//!
//! Each function parses the query once and answers from a single walk of the
//! tree. Malformed queries are fine; answers just reflect whatever the
//! error-tolerant parse recovered.

use crate::logql::{parse, Node, NodeKind, SyntaxTree};
use serde::Serialize;

/// Parser stage presence and count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserInfo {
    /// At least one parser stage exists.
    pub query_with_parser: bool,
    /// Number of parser stages (`json`, `logfmt`, `regexp`, `pattern`, `unpack`).
    pub parser_count: usize,
}

/// Byte span of a stream selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    /// Inclusive start.
    pub from: usize,
    /// Exclusive end.
    pub to: usize,
}

/// Trimmed selector text, `""` for `None`.
pub fn format_query(selector: Option<&str>) -> String {
    selector.unwrap_or("").trim().to_string()
}

/// Names of every node in pre-order.
pub fn parse_to_node_names(query: &str) -> Vec<&'static str> {
    parse(query).iter().map(|n| n.kind().name()).collect()
}

/// True when the parse produced no error nodes.
pub fn is_valid_query(query: &str) -> bool {
    !parse(query).has_errors()
}

/// True unless a metric expression appears anywhere.
pub fn is_logs_query(query: &str) -> bool {
    tree_is_logs_query(&parse(query))
}

fn tree_is_logs_query(tree: &SyntaxTree) -> bool {
    tree.find(NodeKind::MetricExpr).is_none()
}

fn is_parser(node: &Node<'_>) -> bool {
    matches!(
        node.kind(),
        NodeKind::LabelParser
            | NodeKind::JsonExpressionParser
            | NodeKind::LogfmtParser
            | NodeKind::LogfmtExpressionParser
    )
}

/// Counts parser stages.
pub fn is_query_with_parser(query: &str) -> ParserInfo {
    let parser_count = parse(query).iter().filter(is_parser).count();
    ParserInfo {
        query_with_parser: parser_count > 0,
        parser_count,
    }
}

/// Trimmed text of the first parser stage, e.g. `json` or `regexp "(?P<a>.*)"`.
pub fn get_parser_from_query(query: &str) -> Option<String> {
    parse(query)
        .iter()
        .find(is_parser)
        .map(|n| n.text(query).trim().to_string())
}

/// True if some label filter tests `__error__`.
pub fn is_query_pipeline_error_filtering(query: &str) -> bool {
    let tree = parse(query);
    let found = tree.find_all(NodeKind::LabelFilter).any(|filter| {
        filter
            .child_path(&[NodeKind::Matcher, NodeKind::Identifier])
            .is_some_and(|label| label.text(query) == "__error__")
    });
    found
}

/// True if the query has a `label_format` stage.
pub fn is_query_with_label_format(query: &str) -> bool {
    parse(query).find(NodeKind::LabelFormatExpr).is_some()
}

/// True if the query has any label filter.
pub fn is_query_with_label_filter(query: &str) -> bool {
    parse(query).find(NodeKind::LabelFilter).is_some()
}

/// True if the query has any line filter.
pub fn is_query_with_line_filter(query: &str) -> bool {
    parse(query).find(NodeKind::LineFilter).is_some()
}

/// Removes a dangling `|` stage together with the whitespace before it.
///
/// When several stages qualify the last one wins.
pub fn remove_trailing_pipeline(query: &str) -> String {
    let tree = parse(query);
    let mut result = query.to_string();

    for stage in tree.find_all(NodeKind::PipelineStage) {
        if stage.text(query).trim() != "|" {
            continue;
        }
        let head = query[..stage.from()].trim_end();
        result = format!("{}{}", head, &query[stage.to()..]);
    }

    result
}

/// Strips a label filter the user is still typing (`label=`) and reports its
/// label.
///
/// A filter qualifies when its matcher has an error child, its trimmed text
/// ends in `=`, and the matcher names a label. Returns the query unchanged and
/// an empty label when nothing qualifies. When several filters qualify the
/// last one wins.
pub fn get_query_without_trailing_label_filter(query: &str) -> (String, String) {
    let tree = parse(query);
    let mut result = (query.to_string(), String::new());

    for filter in tree.find_all(NodeKind::LabelFilter) {
        let Some(matcher) = filter.child(NodeKind::Matcher) else {
            continue;
        };
        if matcher.child(NodeKind::Error).is_none() {
            continue;
        }
        if !filter.text(query).trim().ends_with('=') {
            continue;
        }
        if let Some(label) = matcher.child(NodeKind::Identifier) {
            result = (
                format!("{}{}", &query[..filter.from()], &query[filter.to()..]),
                label.text(query).to_string(),
            );
        }
    }

    result
}

/// The logs part of a metrics query: first selector plus first pipeline.
///
/// Logs queries are returned unchanged.
pub fn get_log_query_from_metrics_query(query: &str) -> String {
    let tree = parse(query);
    if tree_is_logs_query(&tree) {
        return query.to_string();
    }

    let selector = tree.find(NodeKind::Selector).map_or("", |n| n.text(query));
    let pipeline = tree
        .find(NodeKind::PipelineExpr)
        .map_or("", |n| n.text(query));
    format!("{selector}{pipeline}")
}

/// Spans of every stream selector, in document order.
pub fn get_stream_selector_positions(query: &str) -> Vec<Position> {
    parse(query)
        .find_all(NodeKind::Selector)
        .map(|n| Position {
            from: n.from(),
            to: n.to(),
        })
        .collect()
}

/// Text of every stream selector, in document order.
pub fn get_stream_selectors_from_query(query: &str) -> Vec<String> {
    get_stream_selector_positions(query)
        .into_iter()
        .filter_map(|p| query.get(p.from..p.to))
        .map(str::to_string)
        .collect()
}

/// Finds the longest error-free LogQL fragment in free-form text, e.g. a
/// chat answer that wraps a query in prose. Returns `""` when there is none.
///
/// Running it on its own output returns the same string.
pub fn identify_query(text: &str) -> String {
    use crate::logql::{tokenize, TokenKind};

    let tokens = tokenize(text);
    let mut best: &str = "";

    for (i, start) in tokens.iter().enumerate() {
        if !matches!(
            start.kind,
            TokenKind::LBrace
                | TokenKind::LParen
                | TokenKind::Ident
                | TokenKind::Number
                | TokenKind::Sub
                | TokenKind::Add
        ) {
            continue;
        }
        for end in tokens[i..].iter().rev() {
            let candidate = &text[start.from..end.to];
            if candidate.len() <= best.len() {
                break;
            }
            if is_valid_query(candidate) {
                best = candidate;
                break;
            }
        }
    }

    best.to_string()
}
