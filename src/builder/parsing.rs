//! LogQL text to [`VisualQuery`].
//!
//! One recursive walk over the syntax tree. Constructs the visual model cannot
//! express are collected as [`ParsingError`]s so the caller can fall back to
//! raw text editing.

use super::model::{
    BinaryQuery, BuildResult, LabelFilter, Operation, ParamValue, ParsingError, VectorMatchType,
    VisualQuery,
};
use super::operations::{
    binary_scalar_def, check_params_are_valid, get_definition_by_id, ids, BinaryScalarDef,
};
use super::variables::{replace_variables, return_variables};
use crate::core::{LensError, Result};
use crate::logql::{parse, Node, NodeKind};
use tracing::{debug, error};

/// Builds the visual query for `expr`.
///
/// Never fails: internal inconsistencies are logged and reported as a single
/// [`ParsingError`]. When the result has neither labels nor operations all
/// errors are dropped.
pub fn build_visual_query(expr: &str) -> BuildResult {
    let replaced = replace_variables(expr);
    let tree = parse(&replaced);
    let walker = Walker { expr: &replaced };

    let mut query = VisualQuery::default();
    let mut errors = Vec::new();
    let mut context = Context {
        query: &mut query,
        errors: &mut errors,
    };

    if let Err(err) = walker.handle(tree.root(), &mut context) {
        error!(error = %err, query = expr, "failed to build visual query");
        let text = match err {
            LensError::Parse { message } => message,
            other => other.to_string(),
        };
        errors.push(ParsingError::message(text));
    }

    if query.is_empty() {
        errors.clear();
    }
    debug!(
        labels = query.labels.len(),
        operations = query.operations.len(),
        errors = errors.len(),
        "built visual query"
    );

    BuildResult { query, errors }
}

/// Strips surrounding double quotes and unescapes, or drops backticks.
pub fn handle_quotes(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        let inner = &s[1..s.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some(next @ ('"' | '\\')) => out.push(next),
                    Some(next) => {
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
        return out;
    }
    s.replace('`', "")
}

struct Context<'q> {
    query: &'q mut VisualQuery,
    errors: &'q mut Vec<ParsingError>,
}

struct Walker<'s> {
    expr: &'s str,
}

struct BinaryModifier {
    is_bool: bool,
    matcher: Option<(VectorMatchType, String)>,
}

fn missing(what: &str, node: Node<'_>) -> LensError {
    LensError::parse(format!(
        "{} without {what} at {}..{}",
        node.kind().name(),
        node.from(),
        node.to()
    ))
}

impl<'s> Walker<'s> {
    fn string(&self, node: Option<Node<'_>>) -> String {
        node.map(|n| return_variables(n.text(self.expr)))
            .unwrap_or_default()
    }

    fn make_error(&self, node: Node<'_>) -> ParsingError {
        ParsingError {
            text: self.string(Some(node)),
            from: Some(node.from()),
            to: Some(node.to()),
            parent_type: node.parent().map(|p| p.kind().name().to_string()),
        }
    }

    fn not_supported(&self, node: Node<'_>, message: &str) -> ParsingError {
        let mut err = self.make_error(node);
        err.text = format!("{message}: {}", err.text);
        err
    }

    /// Records the error nodes under `node` that lie outside the `walked`
    /// subtrees, which report their own.
    fn collect_errors<'t>(&self, node: Node<'t>, walked: &[Node<'t>], ctx: &mut Context<'_>) {
        for err in node.descendants().filter(Node::is_error) {
            if err.ancestors().any(|a| walked.contains(&a)) {
                continue;
            }
            // interval variables look like errors to the grammar
            if err.parent().map(|p| p.kind()) == Some(NodeKind::Range) {
                continue;
            }
            ctx.errors.push(self.make_error(err));
        }
    }

    fn handle(&self, node: Node<'_>, ctx: &mut Context<'_>) -> Result<()> {
        match node.kind() {
            NodeKind::Matcher => {
                ctx.query.labels.push(self.label(node));
                if let Some(err) = node.child(NodeKind::Error) {
                    ctx.errors.push(self.make_error(err));
                }
            }
            NodeKind::LineFilter => {
                ctx.query.operations.push(self.line_filter(node));
                self.collect_errors(node, &[], ctx);
            }
            NodeKind::LabelParser => {
                ctx.query.operations.push(self.label_parser(node));
                self.collect_errors(node, &[], ctx);
            }
            NodeKind::JsonExpressionParser => {
                ctx.query.operations.push(self.json_expression_parser(node));
                self.collect_errors(node, &[], ctx);
            }
            NodeKind::LogfmtParser | NodeKind::LogfmtExpressionParser => {
                let (operation, err) = self.logfmt_parser(node);
                ctx.query.operations.push(operation);
                ctx.errors.extend(err);
            }
            NodeKind::LabelFilter => match self.label_filter(node)? {
                Ok(operation) => {
                    ctx.query.operations.push(operation);
                    self.collect_errors(node, &[], ctx);
                }
                Err(err) => ctx.errors.push(err),
            },
            NodeKind::LineFormatExpr => {
                ctx.query.operations.push(Operation::new(
                    ids::LINE_FORMAT,
                    vec![handle_quotes(&self.string(node.child(NodeKind::String))).into()],
                ));
                self.collect_errors(node, &[], ctx);
            }
            NodeKind::LabelFormatMatcher => {
                ctx.query.operations.push(self.label_format(node)?);
                self.collect_errors(node, &[], ctx);
            }
            NodeKind::Decolorize => ctx
                .query
                .operations
                .push(Operation::new(ids::DECOLORIZE, Vec::new())),
            NodeKind::DropLabelsExpr => {
                ctx.query.operations.push(self.label_list(
                    node,
                    ids::DROP,
                    NodeKind::DropLabels,
                    NodeKind::DropLabel,
                ));
                self.collect_errors(node, &[], ctx);
            }
            NodeKind::KeepLabelsExpr => {
                ctx.query.operations.push(self.label_list(
                    node,
                    ids::KEEP,
                    NodeKind::KeepLabels,
                    NodeKind::KeepLabel,
                ));
                self.collect_errors(node, &[], ctx);
            }
            NodeKind::UnwrapExpr => {
                if let Some(operation) = self.unwrap(node, ctx)? {
                    ctx.query.operations.push(operation);
                }
            }
            NodeKind::RangeAggregationExpr => {
                let operation = self.range_aggregation(node, ctx)?;
                ctx.query.operations.push(operation);
            }
            NodeKind::VectorAggregationExpr => {
                let operation = self.vector_aggregation(node, ctx)?;
                ctx.query.operations.push(operation);
            }
            NodeKind::BinOpExpr => self.binary(node, ctx)?,
            NodeKind::Error => {
                // interval variables look like errors to the grammar
                if node.parent().map(|p| p.kind()) != Some(NodeKind::Range) {
                    ctx.errors.push(self.make_error(node));
                }
            }
            _ => {
                for child in node.children() {
                    self.handle(child, ctx)?;
                }
            }
        }
        Ok(())
    }

    fn label(&self, matcher: Node<'_>) -> LabelFilter {
        let label = matcher.child(NodeKind::Identifier);
        let op = label.and_then(|l| l.next_sibling());
        LabelFilter {
            label: self.string(label),
            op: self.string(op),
            value: handle_quotes(&self.string(matcher.child(NodeKind::String))),
        }
    }

    fn line_filter(&self, node: Node<'_>) -> Operation {
        let filter = self.string(node.child(NodeKind::Filter));

        if let Some(ip) = node
            .child(NodeKind::FilterOp)
            .filter(|op| op.child(NodeKind::Ip).is_some())
        {
            let value = handle_quotes(&self.string(ip.child(NodeKind::String)));
            return Operation::new(ids::LINE_FILTER_IP_MATCHES, vec![filter.into(), value.into()]);
        }

        let mut params: Vec<ParamValue> =
            vec![handle_quotes(&self.string(node.child(NodeKind::String))).into()];
        let mut or = node.child(NodeKind::OrFilter);
        while let Some(branch) = or {
            params.push(handle_quotes(&self.string(branch.child(NodeKind::String))).into());
            or = branch.child(NodeKind::OrFilter);
        }

        let id = match filter.as_str() {
            "!=" => ids::LINE_CONTAINS_NOT,
            "|~" => ids::LINE_MATCHES_REGEX,
            "!~" => ids::LINE_MATCHES_REGEX_NOT,
            "|>" => ids::LINE_MATCHES_PATTERN,
            "!>" => ids::LINE_MATCHES_PATTERN_NOT,
            _ => ids::LINE_CONTAINS,
        };
        Operation::new(id, params)
    }

    fn label_parser(&self, node: Node<'_>) -> Operation {
        let parser = self.string(node.first_child());
        let value = handle_quotes(&self.string(node.child(NodeKind::String)));
        let mut params: Vec<ParamValue> = if value.is_empty() {
            Vec::new()
        } else {
            vec![value.into()]
        };

        if let Some(def) = get_definition_by_id(&parser) {
            if !check_params_are_valid(def, &params) {
                params = def.default_params();
            }
        }
        Operation::new(parser, params)
    }

    fn json_expression_parser(&self, node: Node<'_>) -> Operation {
        let params = node
            .descendants()
            .filter(|n| n.kind() == NodeKind::LabelExtractionExpression)
            .map(|n| self.string(Some(n)).into())
            .collect();
        Operation::new(self.string(node.child(NodeKind::Json)), params)
    }

    fn logfmt_parser(&self, node: Node<'_>) -> (Operation, Option<ParsingError>) {
        let mut flags = Vec::new();
        let mut labels: Vec<ParamValue> = Vec::new();
        let mut unexpected = None;

        for child in node.descendants().skip(1) {
            match child.kind() {
                NodeKind::ParserFlag => flags.push(self.string(Some(child))),
                NodeKind::LabelExtractionExpression => labels.push(self.string(Some(child)).into()),
                NodeKind::Error => {
                    unexpected = Some(format!("Unexpected string \"{}\"", self.string(Some(child))));
                }
                _ => {}
            }
        }

        let mut params: Vec<ParamValue> = vec![
            flags.iter().any(|f| f == "--strict").into(),
            flags.iter().any(|f| f == "--keep-empty").into(),
        ];
        params.extend(labels);

        let err = unexpected.map(|message| self.not_supported(node, &message));
        (Operation::new(ids::LOGFMT, params), err)
    }

    /// `Err` is an internal failure, `Ok(Err)` an unsupported filter.
    fn label_filter(&self, node: Node<'_>) -> Result<std::result::Result<Operation, ParsingError>> {
        let combined = [
            NodeKind::Or,
            NodeKind::And,
            NodeKind::Comma,
            NodeKind::LabelFilter,
        ]
        .into_iter()
        .any(|kind| node.child(kind).is_some());
        if combined {
            return Ok(Err(self.not_supported(
                node,
                "Label filter with comma, \"and\", \"or\" not supported in query builder",
            )));
        }

        let filter = node
            .first_child()
            .ok_or_else(|| missing("a filter", node))?;

        let (id, label, op, value) = match filter.kind() {
            NodeKind::IpLabelFilter => {
                let label = filter.child(NodeKind::Identifier);
                let op = label.and_then(|l| l.next_sibling());
                (
                    ids::LABEL_FILTER_IP_MATCHES,
                    label,
                    op,
                    filter.child(NodeKind::String),
                )
            }
            NodeKind::UnitFilter => {
                let inner = filter
                    .first_child()
                    .ok_or_else(|| missing("a unit filter", filter))?;
                let label = inner.first_child();
                let op = label.and_then(|l| l.next_sibling());
                let value = op.and_then(|o| o.next_sibling());
                (ids::LABEL_FILTER, label, op, value)
            }
            _ => {
                let label = filter
                    .first_child()
                    .ok_or_else(|| missing("a label", filter))?;
                let op = label.next_sibling();
                let value = op.and_then(|o| o.next_sibling());
                (ids::LABEL_FILTER, Some(label), op, value)
            }
        };

        let label = self.string(label);
        let op = self.string(op);
        let value = handle_quotes(&self.string(value));

        if id == ids::LABEL_FILTER && format!("{label}{op}{value}") == "__error__=" {
            return Ok(Ok(Operation::new(ids::LABEL_FILTER_NO_ERRORS, Vec::new())));
        }
        Ok(Ok(Operation::new(id, vec![label.into(), op.into(), value.into()])))
    }

    fn label_format(&self, node: Node<'_>) -> Result<Operation> {
        let rename_to = node
            .child(NodeKind::Identifier)
            .ok_or_else(|| missing("a target label", node))?;
        let original = rename_to.next_sibling().and_then(|op| op.next_sibling());
        Ok(Operation::new(
            ids::LABEL_FORMAT,
            vec![
                self.string(original).into(),
                handle_quotes(&self.string(Some(rename_to))).into(),
            ],
        ))
    }

    fn label_list(&self, node: Node<'_>, id: &str, list: NodeKind, item: NodeKind) -> Operation {
        let mut labels = Vec::new();
        let mut current = node.child(list);
        while let Some(chain) = current {
            let label = self.string(chain.child(item));
            if !label.is_empty() {
                labels.push(ParamValue::from(label));
            }
            current = chain.child(list);
        }
        labels.reverse();
        Operation::new(id, labels)
    }

    fn unwrap(&self, node: Node<'_>, ctx: &mut Context<'_>) -> Result<Option<Operation>> {
        let inner = node.child(NodeKind::UnwrapExpr);
        let filter = node.child(NodeKind::LabelFilter);
        for walked in inner.iter().chain(filter.iter()) {
            self.handle(*walked, ctx)?;
        }
        let walked: Vec<Node<'_>> = inner.into_iter().chain(filter).collect();
        self.collect_errors(node, &walked, ctx);

        let Some(unwrap) = node.child(NodeKind::Unwrap) else {
            return Ok(None);
        };
        let next = unwrap.next_sibling();
        let params: Vec<ParamValue> = match next.filter(|n| n.kind() == NodeKind::ConvOp) {
            Some(conv) => vec![
                self.string(conv.next_sibling()).into(),
                self.string(Some(conv)).into(),
            ],
            None => vec![self.string(next).into(), String::new().into()],
        };
        Ok(Some(Operation::new(ids::UNWRAP, params)))
    }

    fn range_aggregation(&self, node: Node<'_>, ctx: &mut Context<'_>) -> Result<Operation> {
        let func = self.string(node.child(NodeKind::RangeOp));
        let log_expr = node.child(NodeKind::LogRangeExpr);
        let mut params = Vec::new();

        if let Some(range) = log_expr.and_then(|l| l.child(NodeKind::Range)) {
            let text = self.string(Some(range));
            let text = text.strip_prefix('[').unwrap_or(&text);
            let text = text.strip_suffix(']').unwrap_or(text);
            params.push(ParamValue::from(text));
        }
        if let Some(number) = node.child(NodeKind::Number) {
            params.push(ParamValue::number(&self.string(Some(number))));
        }

        if let Some(grouping) = node.child(NodeKind::Grouping) {
            ctx.errors.push(self.not_supported(
                grouping,
                "Grouping on a range aggregation not supported in query builder",
            ));
        }

        if let Some(log_expr) = log_expr {
            self.handle(log_expr, ctx)?;
        }
        let walked: Vec<Node<'_>> = log_expr.into_iter().collect();
        self.collect_errors(node, &walked, ctx);
        Ok(Operation::new(func, params))
    }

    fn vector_aggregation(&self, node: Node<'_>, ctx: &mut Context<'_>) -> Result<Operation> {
        let mut func = self.string(node.child(NodeKind::VectorOp));
        let mut params = Vec::new();

        if let Some(number) = node.child(NodeKind::Number) {
            params.push(ParamValue::number(&self.string(Some(number))));
        }

        if let Some(grouping) = node.child(NodeKind::Grouping) {
            if grouping.child(NodeKind::By).is_some() {
                func = format!("__{func}_by");
            } else if grouping.child(NodeKind::Without).is_some() {
                func = format!("__{func}_without");
            }
            params.extend(
                grouping
                    .descendants()
                    .filter(|n| n.kind() == NodeKind::Identifier)
                    .map(|n| ParamValue::from(self.string(Some(n)))),
            );
        }

        if let Some(metric) = node.child(NodeKind::MetricExpr) {
            if metric.first_child().map(|c| c.kind()) == Some(NodeKind::BinOpExpr) {
                ctx.errors.push(ParsingError {
                    text: "Query parsing is ambiguous.".to_string(),
                    from: Some(metric.from()),
                    to: Some(metric.to()),
                    parent_type: None,
                });
            }
            self.handle(metric, ctx)?;
        }
        let walked: Vec<Node<'_>> = node.child(NodeKind::MetricExpr).into_iter().collect();
        self.collect_errors(node, &walked, ctx);

        Ok(Operation::new(func, params))
    }

    fn binary_modifier(&self, node: Option<Node<'_>>) -> Option<BinaryModifier> {
        let node = node?;
        let is_bool = node.child(NodeKind::Bool).is_some();
        let matcher = node.child(NodeKind::OnOrIgnoringModifier).map(|m| {
            let kind = if m.child(NodeKind::On).is_some() {
                VectorMatchType::On
            } else {
                VectorMatchType::Ignoring
            };
            let labels = self.string(
                m.child_path(&[NodeKind::GroupingLabels, NodeKind::GroupingLabelList]),
            );
            (kind, labels)
        });
        if !is_bool && matcher.is_none() {
            return None;
        }
        Some(BinaryModifier { is_bool, matcher })
    }

    fn scalar_def(&self, op: &str, node: Node<'_>) -> Result<&'static BinaryScalarDef> {
        binary_scalar_def(op).ok_or_else(|| {
            LensError::parse(format!(
                "Operator \"{op}\" cannot be applied to a number at {}..{}",
                node.from(),
                node.to()
            ))
        })
    }

    fn binary(&self, node: Node<'_>, ctx: &mut Context<'_>) -> Result<()> {
        let left = node
            .first_child()
            .ok_or_else(|| missing("a left operand", node))?;
        let op = self.string(left.next_sibling());
        let modifier = self.binary_modifier(node.child(NodeKind::BinOpModifier));
        let right = node
            .last_child()
            .ok_or_else(|| missing("a right operand", node))?;
        let is_bool = modifier.as_ref().is_some_and(|m| m.is_bool);

        let number_path = [NodeKind::MetricExpr, NodeKind::LiteralExpr, NodeKind::Number];
        if left.child_path(&number_path).is_none() {
            self.handle(left, ctx)?;
        }

        if right.child_path(&number_path).is_some() {
            let def = self.scalar_def(&op, node)?;
            ctx.query
                .operations
                .push(scalar_operation(def, &self.string(Some(right)), is_bool));
            return Ok(());
        }

        // `query op (number op2 query)`: the leading number becomes an
        // operation of this query and the rest continues here.
        let leading = right
            .child_path(&[NodeKind::MetricExpr, NodeKind::BinOpExpr])
            .map(|_| right.leftmost_leaf())
            .filter(|leaf| leaf.kind() == NodeKind::Number);
        if let Some(number) = leading {
            let def = self.scalar_def(&op, node)?;
            ctx.query
                .operations
                .push(scalar_operation(def, &self.string(Some(number)), is_bool));
            return self.handle(right, ctx);
        }

        let (vector_matches_type, vector_matches) = match modifier.and_then(|m| m.matcher) {
            Some((kind, labels)) => (Some(kind), Some(labels)),
            None => (None, None),
        };
        ctx.query.binary_queries.push(BinaryQuery {
            operator: op,
            bool_modifier: is_bool,
            vector_matches_type,
            vector_matches,
            query: VisualQuery::default(),
        });
        let Some(binary) = ctx.query.binary_queries.last_mut() else {
            return Ok(());
        };
        let mut nested = Context {
            query: &mut binary.query,
            errors: &mut *ctx.errors,
        };
        self.handle(right, &mut nested)
    }
}

fn scalar_operation(def: &BinaryScalarDef, number: &str, is_bool: bool) -> Operation {
    let mut params = vec![ParamValue::number(number)];
    if def.comparison {
        params.push(is_bool.into());
    }
    Operation::new(def.id, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn op(id: &str, params: Vec<ParamValue>) -> Operation {
        Operation::new(id, params)
    }

    fn s(v: &str) -> ParamValue {
        ParamValue::from(v)
    }

    fn build_ok(expr: &str) -> VisualQuery {
        let result = build_visual_query(expr);
        assert!(result.errors.is_empty(), "{expr}: {:?}", result.errors);
        result.query
    }

    #[test]
    fn test_empty_query() {
        let result = build_visual_query("");
        assert_eq!(result, BuildResult::default());
    }

    #[test]
    fn test_line_filters_parser_and_label_filter() {
        let query =
            build_ok(r#"{job="mysql"} |= "error" != "timeout" | json | duration > 10s"#);
        assert_eq!(query.labels, vec![LabelFilter::new("job", "=", "mysql")]);
        assert_eq!(
            query.operations,
            vec![
                op(ids::LINE_CONTAINS, vec![s("error")]),
                op(ids::LINE_CONTAINS_NOT, vec![s("timeout")]),
                op(ids::JSON, vec![]),
                op(ids::LABEL_FILTER, vec![s("duration"), s(">"), s("10s")]),
            ]
        );
    }

    #[test]
    fn test_line_filter_variants() {
        let query = build_ok(r#"{a="b"} |~ "x" or "y" != ip("10.0.0.1") |= `raw`"#);
        assert_eq!(
            query.operations,
            vec![
                op(ids::LINE_MATCHES_REGEX, vec![s("x"), s("y")]),
                op(ids::LINE_FILTER_IP_MATCHES, vec![s("!="), s("10.0.0.1")]),
                op(ids::LINE_CONTAINS, vec![s("raw")]),
            ]
        );
    }

    #[test]
    fn test_parsers() {
        let query = build_ok(
            r#"{a="b"} | logfmt --strict foo, bar="baz" | regexp "(?P<x>\\w+)" | unpack | json first="a.b""#,
        );
        assert_eq!(
            query.operations,
            vec![
                op(ids::LOGFMT, vec![true.into(), false.into(), s("foo"), s(r#"bar="baz""#)]),
                op(ids::REGEXP, vec![s(r"(?P<x>\w+)")]),
                op(ids::UNPACK, vec![]),
                op(ids::JSON, vec![s(r#"first="a.b""#)]),
            ]
        );
    }

    #[test]
    fn test_logfmt_flags() {
        let query = build_ok(r#"{a="b"} | logfmt --keep-empty"#);
        assert_eq!(
            query.operations,
            vec![op(ids::LOGFMT, vec![false.into(), true.into()])]
        );
    }

    #[test]
    fn test_error_label_filter_collapses() {
        let query = build_ok(r#"{a="b"} | json | __error__="""#);
        assert_eq!(query.operations[1], op(ids::LABEL_FILTER_NO_ERRORS, vec![]));
    }

    #[test]
    fn test_label_filter_kinds() {
        let query = build_ok(r#"{a="b"} | addr = ip("10.0.0.0/8") | size > 1KB | status >= 400 | level=~"warn|error""#);
        assert_eq!(
            query.operations,
            vec![
                op(ids::LABEL_FILTER_IP_MATCHES, vec![s("addr"), s("="), s("10.0.0.0/8")]),
                op(ids::LABEL_FILTER, vec![s("size"), s(">"), s("1KB")]),
                op(ids::LABEL_FILTER, vec![s("status"), s(">="), s("400")]),
                op(ids::LABEL_FILTER, vec![s("level"), s("=~"), s("warn|error")]),
            ]
        );
    }

    #[test]
    fn test_combined_label_filter_is_unsupported() {
        let result = build_visual_query(r#"{a="b"} | x="1" or y="2""#);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0]
            .text
            .starts_with("Label filter with comma, \"and\", \"or\" not supported in query builder"));
        assert_eq!(result.query.operations, vec![]);
        assert_eq!(result.query.labels.len(), 1);
    }

    #[test]
    fn test_formatters() {
        let query = build_ok(
            r#"{a="b"} | line_format "{{.msg}}" | label_format new=old, x="{{.y}}" | decolorize | drop a, b | keep c"#,
        );
        assert_eq!(
            query.operations,
            vec![
                op(ids::LINE_FORMAT, vec![s("{{.msg}}")]),
                op(ids::LABEL_FORMAT, vec![s("old"), s("new")]),
                op(ids::LABEL_FORMAT, vec![s(r#""{{.y}}""#), s("x")]),
                op(ids::DECOLORIZE, vec![]),
                op(ids::DROP, vec![s("a"), s("b")]),
                op(ids::KEEP, vec![s("c")]),
            ]
        );
    }

    #[test]
    fn test_range_and_vector_aggregations() {
        let query = build_ok(r#"sum by (host, app) (rate({a="b"} | json [5m]))"#);
        assert_eq!(query.labels, vec![LabelFilter::new("a", "=", "b")]);
        assert_eq!(
            query.operations,
            vec![
                op(ids::JSON, vec![]),
                op("rate", vec![s("5m")]),
                op("__sum_by", vec![s("host"), s("app")]),
            ]
        );

        let query = build_ok(r#"topk(5, quantile_over_time(0.99, {a="b"} | unwrap duration(latency) [1m]))"#);
        assert_eq!(
            query.operations,
            vec![
                op(ids::UNWRAP, vec![s("latency"), s("duration")]),
                op("quantile_over_time", vec![s("1m"), 0.99.into()]),
                op("topk", vec![5.0.into()]),
            ]
        );
    }

    #[test]
    fn test_unwrap_with_post_filter() {
        let query = build_ok(r#"sum_over_time({a="b"} | logfmt | unwrap bytes | __error__="" [5m])"#);
        assert_eq!(
            query.operations,
            vec![
                op(ids::LOGFMT, vec![false.into(), false.into()]),
                op(ids::UNWRAP, vec![s("bytes"), s("")]),
                op(ids::LABEL_FILTER_NO_ERRORS, vec![]),
                op("sum_over_time", vec![s("5m")]),
            ]
        );
    }

    #[test]
    fn test_binary_with_scalar() {
        let query = build_ok(r#"rate({a="b"}[5m]) * 100 > bool 2"#);
        assert_eq!(
            query.operations,
            vec![
                op("rate", vec![s("5m")]),
                op("__multiply_by", vec![100.0.into()]),
                op("__greater_than", vec![2.0.into(), true.into()]),
            ]
        );
    }

    #[test]
    fn test_binary_between_queries() {
        let query = build_ok(r#"rate({a="b"}[5m]) / on (job) rate({c="d"}[5m])"#);
        assert_eq!(query.operations, vec![op("rate", vec![s("5m")])]);
        assert_eq!(query.binary_queries.len(), 1);
        let binary = &query.binary_queries[0];
        assert_eq!(binary.operator, "/");
        assert_eq!(binary.vector_matches_type, Some(VectorMatchType::On));
        assert_eq!(binary.vector_matches.as_deref(), Some("job"));
        assert_eq!(binary.query.labels, vec![LabelFilter::new("c", "=", "d")]);
        assert_eq!(binary.query.operations, vec![op("rate", vec![s("5m")])]);
    }

    #[test]
    fn test_leading_number_is_peeled() {
        let query = build_ok(r#"rate({a="b"}[5m]) + 2 * rate({c="d"}[5m])"#);
        assert_eq!(
            query.operations,
            vec![op("rate", vec![s("5m")]), op("__addition", vec![2.0.into()])]
        );
        assert_eq!(query.binary_queries.len(), 1);
        assert_eq!(query.binary_queries[0].operator, "*");
        assert_eq!(
            query.binary_queries[0].query.labels,
            vec![LabelFilter::new("c", "=", "d")]
        );
    }

    #[test]
    fn test_right_binary_without_number_nests() {
        let query = build_ok(r#"rate({a="b"}[5m]) + rate({c="d"}[5m]) * 2"#);
        assert_eq!(query.labels, vec![LabelFilter::new("a", "=", "b")]);
        assert_eq!(query.binary_queries.len(), 1);
        let nested = &query.binary_queries[0].query;
        assert_eq!(nested.labels, vec![LabelFilter::new("c", "=", "d")]);
        assert_eq!(
            nested.operations,
            vec![op("rate", vec![s("5m")]), op("__multiply_by", vec![2.0.into()])]
        );
    }

    #[test]
    fn test_ambiguous_aggregation() {
        let result = build_visual_query(r#"sum(rate({a="b"}[5m]) / rate({c="d"}[5m]))"#);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].text, "Query parsing is ambiguous.");
        assert_eq!(result.query.operations.last(), Some(&op("sum", vec![])));
    }

    #[test]
    fn test_logical_operator_with_scalar_is_internal_error() {
        let result = build_visual_query(r#"rate({a="b"}[5m]) and 2"#);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].text.contains("\"and\""));
        assert_eq!(result.errors[0].from, None);
    }

    #[test]
    fn test_variables() {
        let query = build_ok(r#"rate({job="$job"} |= "${text}" [$__interval])"#);
        assert_eq!(query.labels, vec![LabelFilter::new("job", "=", "$job")]);
        assert_eq!(
            query.operations,
            vec![
                op(ids::LINE_CONTAINS, vec![s("${text}")]),
                op("rate", vec![s("$__interval")]),
            ]
        );
    }

    #[test]
    fn test_syntax_errors_are_reported() {
        let result = build_visual_query(r#"{a="b"} | json | x="y" 2"#);
        assert!(!result.errors.is_empty());
        assert_eq!(result.query.labels.len(), 1);
        assert_eq!(result.errors[0].parent_type.as_deref(), Some("LogQL"));
    }

    #[test]
    fn test_incomplete_stages_are_reported() {
        let incomplete = [
            r#"{job="api"} |= "#,
            r#"{job="api"} | json | level="#,
            r#"{job="api"} | regexp"#,
            r#"{job="api"} | drop"#,
            r#"{job="api"} | line_format"#,
            r#"sum by (host (rate({a="b"}[5m]))"#,
            r#"rate({a="b"}[5m]"#,
        ];
        for expr in incomplete {
            let result = build_visual_query(expr);
            assert!(!result.query.is_empty(), "{expr}");
            assert!(!result.errors.is_empty(), "{expr} built without errors");
        }
    }

    #[test]
    fn test_incomplete_line_filter_error_span() {
        let expr = r#"{job="api"} |= "#;
        let result = build_visual_query(expr);
        assert!(!result.errors.is_empty());
        let err = &result.errors[0];
        assert!(err.from.is_some_and(|from| from >= expr.find("|=").unwrap()));
    }

    #[test]
    fn test_range_aggregation_grouping_is_unsupported() {
        let result = build_visual_query(r#"sum_over_time({a="b"} | unwrap bytes [5m]) by (host)"#);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].text,
            "Grouping on a range aggregation not supported in query builder: by (host)"
        );
    }

    #[test]
    fn test_handle_quotes() {
        assert_eq!(handle_quotes(r#""a\"b\\c""#), r#"a"b\c"#);
        assert_eq!(handle_quotes(r#""\\\"""#), r#"\""#);
        assert_eq!(handle_quotes("`raw\\d`"), "raw\\d");
        assert_eq!(handle_quotes("plain"), "plain");
    }
}
