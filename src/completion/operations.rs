//! Static completion catalogues.

use super::CompletionItem;
use once_cell::sync::Lazy;

struct Keyword {
    name: &'static str,
    detail: Option<&'static str>,
    documentation: &'static str,
}

const fn keyword(name: &'static str, documentation: &'static str) -> Keyword {
    Keyword {
        name,
        detail: None,
        documentation,
    }
}

const fn detailed(name: &'static str, detail: &'static str, documentation: &'static str) -> Keyword {
    Keyword {
        name,
        detail: Some(detail),
        documentation,
    }
}

const AGGREGATION_OPERATORS: &[Keyword] = &[
    keyword("avg", "Calculate the average over dimensions"),
    keyword("bottomk", "Smallest k elements by sample value"),
    keyword("count", "Count number of elements in the vector"),
    keyword("max", "Select maximum over dimensions"),
    keyword("min", "Select minimum over dimensions"),
    keyword("stddev", "Calculate population standard deviation over dimensions"),
    keyword("stdvar", "Calculate population standard variance over dimensions"),
    keyword("sum", "Calculate sum over dimensions"),
    keyword("topk", "Largest k elements by sample value"),
];

const RANGE_VECTOR_FUNCTIONS: &[Keyword] = &[
    detailed(
        "avg_over_time",
        "avg_over_time(range-vector)",
        "The average of all values in the specified interval.",
    ),
    detailed(
        "bytes_over_time",
        "bytes_over_time(range-vector)",
        "Counts the amount of bytes used by each log stream for a given range",
    ),
    detailed(
        "bytes_rate",
        "bytes_rate(range-vector)",
        "Calculates the number of bytes per second for each stream.",
    ),
    detailed(
        "first_over_time",
        "first_over_time(range-vector)",
        "The first of all values in the specified interval. Only available in Loki 2.3+.",
    ),
    detailed(
        "last_over_time",
        "last_over_time(range-vector)",
        "The last of all values in the specified interval. Only available in Loki 2.3+.",
    ),
    detailed(
        "sum_over_time",
        "sum_over_time(range-vector)",
        "The sum of all values in the specified interval.",
    ),
    detailed(
        "count_over_time",
        "count_over_time(range-vector)",
        "The count of all values in the specified interval.",
    ),
    detailed(
        "max_over_time",
        "max_over_time(range-vector)",
        "The maximum of all values in the specified interval.",
    ),
    detailed(
        "min_over_time",
        "min_over_time(range-vector)",
        "The minimum of all values in the specified interval.",
    ),
    detailed(
        "quantile_over_time",
        "quantile_over_time(scalar, range-vector)",
        "The φ-quantile (0 ≤ φ ≤ 1) of the values in the specified interval.",
    ),
    detailed(
        "rate",
        "rate(v range-vector)",
        "Calculates the number of entries per second.",
    ),
    detailed(
        "stddev_over_time",
        "stddev_over_time(range-vector)",
        "The population standard deviation of the values in the specified interval.",
    ),
    detailed(
        "stdvar_over_time",
        "stdvar_over_time(range-vector)",
        "The population standard variance of the values in the specified interval.",
    ),
];

const BUILT_IN_FUNCTIONS: &[Keyword] = &[detailed(
    "vector",
    "vector(scalar)",
    "Returns the scalar as a vector with no labels.",
)];

const UNWRAP_FUNCTIONS: &[Keyword] = &[
    keyword(
        "duration_seconds",
        "Will convert the label value in seconds from the go duration format (e.g 5m, 24s30ms).",
    ),
    keyword("duration", "Short version of duration_seconds()."),
    keyword(
        "bytes",
        "Will convert the label value to raw bytes applying the bytes unit (e.g. 5 MiB, 3k, 1G).",
    ),
];

/// Parser stage names, alphabetically.
pub const PIPE_PARSERS: &[&str] = &["json", "logfmt", "pattern", "regexp", "unpack"];

const DURATIONS: &[&str] = &["$__interval", "$__range", "1m", "5m", "10m", "30m", "1h", "1d"];

struct LineFilter {
    op: &'static str,
    after_pipe: bool,
}

const LINE_FILTERS: &[LineFilter] = &[
    LineFilter {
        op: "|=",
        after_pipe: true,
    },
    LineFilter {
        op: "!=",
        after_pipe: false,
    },
    LineFilter {
        op: "|~",
        after_pipe: true,
    },
    LineFilter {
        op: "!~",
        after_pipe: false,
    },
];

fn keyword_items(keywords: &[Keyword], insert: impl Fn(&str) -> String) -> Vec<CompletionItem> {
    keywords
        .iter()
        .map(|k| CompletionItem {
            label: k.name.to_string(),
            insert_text: insert(k.name),
            documentation: Some(k.documentation.to_string()),
            detail: k.detail.map(str::to_string),
        })
        .collect()
}

/// `{}`.
pub static LOG_COMPLETIONS: Lazy<Vec<CompletionItem>> =
    Lazy::new(|| vec![CompletionItem::new("{}", "{}")]);

/// Vector aggregation operators, inserted as `name()`.
pub static AGGREGATION_COMPLETIONS: Lazy<Vec<CompletionItem>> =
    Lazy::new(|| keyword_items(AGGREGATION_OPERATORS, |name| format!("{name}()")));

/// Range vector functions, inserted with a selector and interval template.
pub static FUNCTION_COMPLETIONS: Lazy<Vec<CompletionItem>> = Lazy::new(|| {
    keyword_items(RANGE_VECTOR_FUNCTIONS, |name| {
        format!("{name}({{}}[$__interval])")
    })
});

/// `vector()`.
pub static BUILT_IN_FUNCTIONS_COMPLETIONS: Lazy<Vec<CompletionItem>> =
    Lazy::new(|| keyword_items(BUILT_IN_FUNCTIONS, |name| format!("{name}()")));

/// Conversion functions accepted by `unwrap`.
pub static UNWRAP_FUNCTION_COMPLETIONS: Lazy<Vec<CompletionItem>> =
    Lazy::new(|| keyword_items(UNWRAP_FUNCTIONS, |name| format!("{name}()")));

/// Range durations.
pub static DURATION_COMPLETIONS: Lazy<Vec<CompletionItem>> = Lazy::new(|| {
    DURATIONS
        .iter()
        .map(|d| CompletionItem::new(*d, *d))
        .collect()
});

/// Everything valid at the start of an expression.
pub fn root_completions() -> Vec<CompletionItem> {
    [
        &*LOG_COMPLETIONS,
        &*AGGREGATION_COMPLETIONS,
        &*BUILT_IN_FUNCTIONS_COMPLETIONS,
        &*FUNCTION_COMPLETIONS,
    ]
    .into_iter()
    .flatten()
    .cloned()
    .collect()
}

/// Everything valid inside a vector aggregation.
pub fn aggregation_argument_completions() -> Vec<CompletionItem> {
    FUNCTION_COMPLETIONS
        .iter()
        .chain(AGGREGATION_COMPLETIONS.iter())
        .cloned()
        .collect()
}

/// Line filter operators. Right after a pipe only the `|` operators apply,
/// and their leading `|` is not inserted again.
pub fn line_filter_completions(after_pipe: bool) -> Vec<CompletionItem> {
    LINE_FILTERS
        .iter()
        .filter(|f| !after_pipe || f.after_pipe)
        .map(|f| {
            let insert = if after_pipe {
                f.op.replacen('|', "", 1)
            } else {
                f.op.to_string()
            };
            CompletionItem {
                label: format!("{} \"\"", f.op),
                insert_text: format!("{insert} \"\""),
                documentation: Some(String::new()),
                detail: None,
            }
        })
        .collect()
}

/// Parser stages, each inserted after `prefix`.
pub fn parser_completions(prefix: &str) -> Vec<CompletionItem> {
    PIPE_PARSERS
        .iter()
        .map(|parser| CompletionItem {
            label: (*parser).to_string(),
            insert_text: format!("{prefix}{parser}"),
            documentation: Some("Parse content using the Loki parser".to_string()),
            detail: None,
        })
        .collect()
}

/// `unwrap`, `line_format` and `label_format`, each inserted after `prefix`.
pub fn formatter_completions(prefix: &str) -> Vec<CompletionItem> {
    [
        (
            "unwrap",
            "unwrap".to_string(),
            "Unwrap a log line's JSON object into a set of labels",
        ),
        (
            "line_format",
            "line_format \"{{.}}\"".to_string(),
            "Format a log line",
        ),
        (
            "label_format",
            "label_format".to_string(),
            "Format a log line's labels",
        ),
    ]
    .into_iter()
    .map(|(label, insert, doc)| CompletionItem {
        label: label.to_string(),
        insert_text: format!("{prefix}{insert}"),
        documentation: Some(doc.to_string()),
        detail: None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|i| i.label.as_str()).collect()
    }

    #[test]
    fn test_root_completions() {
        let items = root_completions();
        assert_eq!(items[0].insert_text, "{}");
        assert_eq!(items.len(), 1 + 9 + 1 + 13);

        let rate = items.iter().find(|i| i.label == "rate").unwrap();
        assert_eq!(rate.insert_text, "rate({}[$__interval])");
        assert_eq!(rate.detail.as_deref(), Some("rate(v range-vector)"));

        let sum = items.iter().find(|i| i.label == "sum").unwrap();
        assert_eq!(sum.insert_text, "sum()");
        assert!(sum.detail.is_none());
    }

    #[test]
    fn test_aggregation_argument_completions() {
        let items = aggregation_argument_completions();
        assert_eq!(items.first().unwrap().label, "avg_over_time");
        assert_eq!(items.last().unwrap().label, "topk");
        assert!(!items.iter().any(|i| i.label == "{}"));
    }

    #[test]
    fn test_line_filters() {
        let items = line_filter_completions(false);
        assert_eq!(labels(&items), vec![r#"|= """#, r#"!= """#, r#"|~ """#, r#"!~ """#]);
        assert_eq!(items[0].insert_text, r#"|= """#);

        let items = line_filter_completions(true);
        assert_eq!(labels(&items), vec![r#"|= """#, r#"|~ """#]);
        assert_eq!(items[0].insert_text, r#"= """#);
        assert_eq!(items[1].insert_text, r#"~ """#);
    }

    #[test]
    fn test_parsers_are_sorted() {
        let items = parser_completions(" | ");
        let mut sorted = labels(&items);
        sorted.sort_unstable();
        assert_eq!(labels(&items), sorted);
        assert_eq!(items[0].insert_text, " | json");
    }

    #[test]
    fn test_unwrap_functions() {
        assert_eq!(
            labels(&UNWRAP_FUNCTION_COMPLETIONS),
            vec!["duration_seconds", "duration", "bytes"]
        );
        assert_eq!(UNWRAP_FUNCTION_COMPLETIONS[2].insert_text, "bytes()");
    }

    #[test]
    fn test_durations() {
        assert_eq!(DURATION_COMPLETIONS[0].insert_text, "$__interval");
        assert_eq!(DURATION_COMPLETIONS.len(), 8);
    }
}
