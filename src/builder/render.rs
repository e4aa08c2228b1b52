//! [`VisualQuery`] back to LogQL text.

use super::model::{BinaryQuery, LabelFilter, Operation, ParamValue, VisualQuery};
use super::operations::{
    aggregation_parts, binary_scalar_def_by_id, category_of, get_definition_by_id, ids, Category,
};

/// Renders a visual query as LogQL.
///
/// Building the rendered text again yields the same labels and operations.
pub fn render_visual_query(query: &VisualQuery) -> String {
    let mut expr = render_labels(&query.labels);
    for operation in &query.operations {
        expr = render_operation(operation, expr);
    }
    for binary in &query.binary_queries {
        expr = render_binary(expr, binary);
    }
    expr
}

/// `{a="b", c=~"d"}`.
pub fn render_labels(labels: &[LabelFilter]) -> String {
    let matchers = labels
        .iter()
        .map(|l| format!("{}{}{}", l.label, l.op, double_quoted(&l.value)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{matchers}}}")
}

fn joined<'a>(params: impl IntoIterator<Item = &'a ParamValue>, sep: &str) -> String {
    params
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

/// `value` as a double-quoted LogQL string.
pub(crate) fn double_quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn backticked(value: &str) -> String {
    if value.contains('`') {
        double_quoted(value)
    } else {
        format!("`{value}`")
    }
}

fn render_binary(left: String, binary: &BinaryQuery) -> String {
    let mut out = format!("{left} {}", binary.operator);
    if binary.bool_modifier {
        out.push_str(" bool");
    }
    if let (Some(kind), Some(labels)) = (binary.vector_matches_type, &binary.vector_matches) {
        out.push_str(&format!(" {}({labels})", kind.as_str()));
    }

    let right = render_visual_query(&binary.query);
    let compound = !binary.query.binary_queries.is_empty()
        || binary
            .query
            .operations
            .iter()
            .any(|o| category_of(&o.id) == Some(Category::BinaryScalar));
    if compound {
        format!("{out} ({right})")
    } else {
        format!("{out} {right}")
    }
}

fn render_operation(operation: &Operation, inner: String) -> String {
    let id = operation.id.as_str();
    let p = |i: usize| operation.param(i);

    match category_of(id) {
        Some(Category::Format) => render_parser(operation, inner),
        Some(Category::LineFilter) => render_line_filter(operation, inner),
        Some(Category::LabelFilter) => render_label_filter(operation, inner),
        Some(Category::Formatter) => match id {
            ids::LINE_FORMAT => format!("{inner} | line_format {}", backticked(&p(0))),
            ids::LABEL_FORMAT => format!("{inner} | label_format {}={}", p(1), p(0)),
            ids::DECOLORIZE => format!("{inner} | decolorize"),
            _ => format!("{inner} | {id} {}", joined(&operation.params, ", ")),
        },
        Some(Category::Unwrap) => {
            let conversion = p(1);
            if conversion.is_empty() {
                format!("{inner} | unwrap {}", p(0))
            } else {
                format!("{inner} | unwrap {conversion}({})", p(0))
            }
        }
        Some(Category::RangeFunction) => {
            if operation.params.len() > 1 {
                format!("{id}({}, {inner} [{}])", p(1), p(0))
            } else {
                format!("{id}({inner} [{}])", p(0))
            }
        }
        Some(Category::Aggregation) => render_aggregation(operation, inner),
        Some(Category::BinaryScalar) => {
            let Some(def) = binary_scalar_def_by_id(id) else {
                return inner;
            };
            let modifier = if def.comparison && operation.params.get(1).is_some_and(|b| b.as_bool())
            {
                " bool"
            } else {
                ""
            };
            format!("{inner} {}{modifier} {}", def.sign, p(0))
        }
        None => {
            if operation.params.is_empty() {
                format!("{inner} | {id}")
            } else {
                format!("{inner} | {id} {}", joined(&operation.params, ", "))
            }
        }
    }
}

fn render_parser(operation: &Operation, inner: String) -> String {
    let id = operation.id.as_str();
    match id {
        ids::REGEXP | ids::PATTERN => format!("{inner} | {id} {}", backticked(&operation.param(0))),
        ids::LOGFMT => {
            let mut out = format!("{inner} | logfmt");
            let flag = |i: usize| operation.params.get(i).is_some_and(|v| v.as_bool());
            if flag(0) {
                out.push_str(" --strict");
            }
            if flag(1) {
                out.push_str(" --keep-empty");
            }
            let labels = joined(operation.params.iter().skip(2), ", ");
            if !labels.is_empty() {
                out.push(' ');
                out.push_str(&labels);
            }
            out
        }
        _ if operation.params.is_empty() => format!("{inner} | {id}"),
        _ => format!("{inner} | {id} {}", joined(&operation.params, ", ")),
    }
}

fn render_line_filter(operation: &Operation, inner: String) -> String {
    if operation.id == ids::LINE_FILTER_IP_MATCHES {
        return format!(
            "{inner} {} ip({})",
            operation.param(0),
            backticked(&operation.param(1))
        );
    }

    let sign = match operation.id.as_str() {
        ids::LINE_CONTAINS_NOT => "!=",
        ids::LINE_MATCHES_REGEX => "|~",
        ids::LINE_MATCHES_REGEX_NOT => "!~",
        ids::LINE_MATCHES_PATTERN => "|>",
        ids::LINE_MATCHES_PATTERN_NOT => "!>",
        _ => "|=",
    };
    let values = operation
        .params
        .iter()
        .map(|v| backticked(&v.to_string()))
        .collect::<Vec<_>>()
        .join(" or ");
    format!("{inner} {sign} {values}")
}

fn render_label_filter(operation: &Operation, inner: String) -> String {
    let (label, op, value) = (operation.param(0), operation.param(1), operation.param(2));
    match operation.id.as_str() {
        ids::LABEL_FILTER_NO_ERRORS => format!("{inner} | __error__=``"),
        ids::LABEL_FILTER_IP_MATCHES => format!("{inner} | {label}{op}ip({})", backticked(&value)),
        _ if matches!(op.as_str(), "=" | "!=" | "=~" | "!~") => {
            format!("{inner} | {label}{op}{}", backticked(&value))
        }
        _ => format!("{inner} | {label} {op} {value}"),
    }
}

fn render_aggregation(operation: &Operation, inner: String) -> String {
    let (func, grouping) = match aggregation_parts(&operation.id) {
        Some((func, kind)) if get_definition_by_id(&operation.id).is_none() => (func, Some(kind)),
        _ => (operation.id.as_str(), None),
    };
    let leading = get_definition_by_id(func).map_or(0, |d| d.params.len());
    let args: String = operation
        .params
        .iter()
        .take(leading)
        .map(|v| format!("{v}, "))
        .collect();

    match grouping {
        Some(kind) => {
            let labels = joined(operation.params.iter().skip(leading), ", ");
            format!("{func} {}({labels}) ({args}{inner})", kind.as_str())
        }
        None => format!("{func}({args}{inner})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_visual_query;
    use pretty_assertions::assert_eq;

    fn assert_round_trip(expr: &str) {
        let first = build_visual_query(expr);
        assert!(first.errors.is_empty(), "{expr}: {:?}", first.errors);

        let rendered = render_visual_query(&first.query);
        let second = build_visual_query(&rendered);
        assert!(second.errors.is_empty(), "{rendered}: {:?}", second.errors);

        let sorted = |q: &VisualQuery| {
            let mut labels = q.labels.clone();
            labels.sort_by(|a, b| (&a.label, &a.op, &a.value).cmp(&(&b.label, &b.op, &b.value)));
            labels
        };
        assert_eq!(sorted(&first.query), sorted(&second.query), "{rendered}");
        assert_eq!(first.query.operations, second.query.operations, "{rendered}");
        assert_eq!(
            first.query.binary_queries, second.query.binary_queries,
            "{rendered}"
        );
    }

    #[test]
    fn test_render_simple() {
        let query = build_visual_query(r#"{job="mysql"} |= "error" | json"#).query;
        assert_eq!(render_visual_query(&query), r#"{job="mysql"} |= `error` | json"#);
    }

    #[test]
    fn test_render_aggregations() {
        let query = build_visual_query(r#"sum by (host) (rate({a="b"}[5m]))"#).query;
        assert_eq!(render_visual_query(&query), r#"sum by(host) (rate({a="b"} [5m]))"#);

        let query = build_visual_query(r#"topk(3, count_over_time({a="b"}[1m]))"#).query;
        assert_eq!(
            render_visual_query(&query),
            r#"topk(3, count_over_time({a="b"} [1m]))"#
        );
    }

    #[test]
    fn test_render_escapes() {
        let query = build_visual_query(r#"{a="x\"y"} |= "has`tick""#).query;
        assert_eq!(render_visual_query(&query), r#"{a="x\"y"} |= "has`tick""#);
    }

    #[test]
    fn test_round_trips() {
        let queries = [
            r#"{job="mysql"} |= "error" != "timeout" | json | duration > 10s"#,
            r#"{a="b", c!~"d.*"} |~ "x" or "y" != ip("10.0.0.1") | logfmt --strict foo, bar="baz""#,
            r#"{a="b"} | regexp "(?P<x>\\w+)" | unpack | json first="a.b" | __error__="""#,
            r#"{a="b"} | addr = ip("10.0.0.0/8") | size > 1KB | status >= 400 | level=~"warn|error""#,
            r#"{a="b"} | line_format "{{.msg}}" | label_format new=old | decolorize | drop a, b | keep c"#,
            r#"sum by (host, app) (rate({a="b"} | json [5m]))"#,
            r#"topk(5, quantile_over_time(0.99, {a="b"} | unwrap duration(latency) [1m]))"#,
            r#"sum_over_time({a="b"} | logfmt | unwrap bytes | __error__="" [5m])"#,
            r#"rate({a="b"}[5m]) * 100 > bool 2"#,
            r#"rate({a="b"}[5m]) / on (job) rate({c="d"}[5m])"#,
            r#"rate({a="b"}[5m]) + 2 * rate({c="d"}[5m])"#,
            r#"rate({a="b"}[5m]) + rate({c="d"}[5m]) * 2"#,
            r#"rate({job="$job"} |= "${text}" [$__interval])"#,
        ];
        for query in queries {
            assert_round_trip(query);
        }
    }
}
