//! Visual query builder and query introspection tests through the public API.

use logql_lens::builder::operations::ids;
use logql_lens::builder::{
    build_visual_query, render_visual_query, replace_variables, return_variables, LabelFilter,
    VisualQuery,
};
use logql_lens::completion::human_file_size;
use logql_lens::query::{get_query_without_trailing_label_filter, identify_query, is_valid_query};
use logql_lens::validate_query;
use pretty_assertions::assert_eq;

fn sorted_labels(query: &VisualQuery) -> Vec<LabelFilter> {
    let mut labels = query.labels.clone();
    labels.sort_by(|a, b| (&a.label, &a.op, &a.value).cmp(&(&b.label, &b.op, &b.value)));
    labels
}

fn assert_equivalent(a: &VisualQuery, b: &VisualQuery, context: &str) {
    assert_eq!(sorted_labels(a), sorted_labels(b), "labels of {context}");
    assert_eq!(a.operations, b.operations, "operations of {context}");
    assert_eq!(
        a.binary_queries.len(),
        b.binary_queries.len(),
        "binary queries of {context}"
    );
    for (x, y) in a.binary_queries.iter().zip(&b.binary_queries) {
        assert_eq!(x.operator, y.operator, "operator in {context}");
        assert_equivalent(&x.query, &y.query, context);
    }
}

#[test]
fn test_empty_query_has_no_errors() {
    let result = build_visual_query("");
    assert!(result.query.is_empty());
    assert!(result.errors.is_empty());
    assert!(validate_query("").is_empty());
}

#[test]
fn test_mysql_pipeline() {
    let result =
        build_visual_query(r#"{job="mysql"} |= "error" != "timeout" | json | duration > 10s"#);
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    let query = result.query;
    assert_eq!(query.labels, vec![LabelFilter::new("job", "=", "mysql")]);
    let ids: Vec<&str> = query.operations.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            ids::LINE_CONTAINS,
            ids::LINE_CONTAINS_NOT,
            ids::JSON,
            ids::LABEL_FILTER
        ]
    );
    assert_eq!(query.operations[3].param(0), "duration");
}

#[test]
fn test_render_then_rebuild_is_equivalent() {
    let queries = [
        r#"{job="mysql"} |= "error" != "timeout" | json | duration > 10s"#,
        r#"{app="web", env=~"prod|staging"} |~ "5\\d\\d" | logfmt | status >= 500"#,
        r#"{a="b"} | pattern "<ip> - <_>" | line_format "{{.ip}}""#,
        r#"sum by (host) (count_over_time({a="b"} | json [1m]))"#,
        r#"avg_over_time({a="b"} | logfmt | unwrap latency | __error__="" [5m])"#,
        r#"sum(rate({a="b"}[5m])) / sum(rate({a="c"}[5m]))"#,
        r#"topk(10, sum by (path) (rate({a="b"} | json [5m])))"#,
    ];

    for text in queries {
        let first = build_visual_query(text);
        assert!(first.errors.is_empty(), "{text}: {:?}", first.errors);

        let rendered = render_visual_query(&first.query);
        assert!(is_valid_query(&rendered), "{text} rendered as {rendered}");

        let second = build_visual_query(&rendered);
        assert!(second.errors.is_empty(), "{rendered}: {:?}", second.errors);
        assert_equivalent(&first.query, &second.query, text);
    }
}

#[test]
fn test_variables_survive_building() {
    let text = r#"sum(count_over_time({job="$job"} |= "${term}" [$__interval]))"#;
    let result = build_visual_query(text);
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.query.labels, vec![LabelFilter::new("job", "=", "$job")]);

    let rendered = render_visual_query(&result.query);
    assert!(rendered.contains("$job"));
    assert!(rendered.contains("${term}"));
    assert!(rendered.contains("[$__interval]"));
}

#[test]
fn test_variable_placeholder_round_trip() {
    let forms = ["$var", "[[var]]", "[[var:fmt]]", "${var}", "${var:fmt}"];
    for a in forms {
        for b in forms {
            let text = format!("{a} and {b}");
            assert_eq!(return_variables(&replace_variables(&text)), text);
        }
    }
}

#[test]
fn test_syntax_errors_become_diagnostics() {
    let text = "{job=\"api\"}\n| json |= ";
    let diagnostics = validate_query(text);
    assert!(!diagnostics.is_empty());
    assert!(diagnostics.iter().all(|d| d.end_line == 2), "{diagnostics:?}");

    let result = build_visual_query(text);
    assert!(!result.errors.is_empty());
}

#[test]
fn test_trailing_label_filter() {
    assert_eq!(
        get_query_without_trailing_label_filter(r#"{job="a"} | label="#),
        (r#"{job="a"} | "#.to_string(), "label".to_string())
    );
}

#[test]
fn test_identify_query_strips_prose() {
    let query = r#"sum(rate({job="mysql"} |= "error" [5m]))"#;
    let text = format!("Try this: {query} which counts errors per second.");

    let found = identify_query(&text);
    assert_eq!(found, query);
    assert_eq!(identify_query(&found), found);
}

#[test]
fn test_file_sizes() {
    assert_eq!(human_file_size(0, false, 1), "0 B");
    assert_eq!(human_file_size(1024, false, 1), "1.0 KiB");
    assert_eq!(human_file_size(1536, false, 1), "1.5 KiB");
    assert_eq!(human_file_size(1024 * 1024, false, 1), "1.0 MiB");
    assert_eq!(human_file_size(1500, true, 1), "1.5 kB");
}
