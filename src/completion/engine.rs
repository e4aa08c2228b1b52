//! Turns a [`Situation`] into completion items, querying the backend where
//! needed.

use super::operations::{
    aggregation_argument_completions, formatter_completions, line_filter_completions,
    parser_completions, root_completions, DURATION_COMPLETIONS,
};
use super::situation::{classify, matchers_expr, Label, Situation};
use super::size::human_file_size;
use super::CompletionItem;
use crate::backend::{LokiBackend, SampleFrame};
use crate::core::{CompletionConfig, LensError, Result};
use crate::query::{get_query_without_trailing_label_filter, is_query_with_parser};
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Sender half of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Marks the paired request as superseded.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by an in-flight completion request.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A connected handle and token.
    pub fn new() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the handle
    /// is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Completion engine over a [`LokiBackend`].
pub struct CompletionEngine<B> {
    backend: B,
    config: CompletionConfig,
}

impl<B: LokiBackend> CompletionEngine<B> {
    /// Creates an engine.
    pub fn new(backend: B, config: CompletionConfig) -> Self {
        Self { backend, config }
    }

    /// The backend in use.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Classifies `cursor` in `text` and completes it.
    pub async fn complete_at(&self, text: &str, cursor: usize) -> Vec<CompletionItem> {
        match classify(text, cursor) {
            Some(situation) => self.complete(&situation).await,
            None => Vec::new(),
        }
    }

    /// Completes `situation`, abandoning the request when `token` fires.
    pub async fn complete_cancellable(
        &self,
        situation: &Situation,
        token: &CancelToken,
    ) -> Result<Vec<CompletionItem>> {
        if token.is_cancelled() {
            return Err(LensError::Cancelled);
        }
        tokio::select! {
            items = self.complete(situation) => Ok(items),
            () = token.cancelled() => {
                debug!("completion request superseded");
                Err(LensError::Cancelled)
            }
        }
    }

    /// Completion items for `situation`. Backend failures are logged and
    /// yield fewer items, never an error.
    pub async fn complete(&self, situation: &Situation) -> Vec<CompletionItem> {
        match situation {
            Situation::Empty | Situation::AtRoot => root_completions(),
            Situation::InRange => DURATION_COMPLETIONS.clone(),
            Situation::InAggregation => aggregation_argument_completions(),
            Situation::InLabelSelectorNoLabelName { other_labels } => {
                self.label_names(other_labels).await
            }
            Situation::InLabelSelectorWithLabelName {
                label_name,
                between_quotes,
                other_labels,
            } => {
                self.label_values(label_name, *between_quotes, other_labels)
                    .await
            }
            Situation::AfterSelector {
                log_query,
                after_pipe,
                has_space,
            } => {
                self.after_selector(log_query, *after_pipe, *has_space)
                    .await
            }
            Situation::InLabelFilterMatcher { log_query } => self.detected_values(log_query).await,
        }
    }

    async fn label_names(&self, other_labels: &[Label]) -> Vec<CompletionItem> {
        if other_labels.is_empty() {
            let names = match self.backend.label_names().await {
                Ok(names) => names,
                Err(e) => {
                    warn!(error = %e, "failed to fetch label names");
                    return Vec::new();
                }
            };
            return self
                .limited(names)
                .into_iter()
                .map(|name| {
                    let insert = format!("{name}=");
                    CompletionItem::new(name, insert)
                })
                .collect();
        }

        let matchers = matchers_expr(other_labels);
        let Some(total) = self.selector_size(&matchers).await else {
            return Vec::new();
        };

        let candidates = match self.backend.label_names_for(other_labels).await {
            Ok(names) => self.limited(names),
            Err(e) => {
                warn!(error = %e, "failed to fetch label names for selector");
                return Vec::new();
            }
        };
        let candidates: Vec<String> = candidates
            .into_iter()
            .filter(|name| !other_labels.iter().any(|l| &l.name == name))
            .collect();

        let sizes = self
            .sizes(
                candidates
                    .iter()
                    .map(|name| format!("{{{matchers},{name}=~\".*\"}}"))
                    .collect(),
            )
            .await;

        candidates
            .into_iter()
            .zip(sizes)
            .map(|(name, size)| {
                let detail = size.map(|size| {
                    format!(
                        "\"{name}\" label is present in ~{}/{} logs.",
                        human_file_size(size, false, 1),
                        human_file_size(total, false, 1)
                    )
                });
                let insert = format!("{name}=");
                CompletionItem {
                    label: name,
                    insert_text: insert,
                    documentation: None,
                    detail,
                }
            })
            .collect()
    }

    async fn label_values(
        &self,
        label_name: &str,
        between_quotes: bool,
        other_labels: &[Label],
    ) -> Vec<CompletionItem> {
        let values = match self.backend.label_values(label_name).await {
            Ok(values) => self.limited(values),
            Err(e) => {
                warn!(label = label_name, error = %e, "failed to fetch label values");
                return Vec::new();
            }
        };
        let insert = |value: &str| {
            if between_quotes {
                value.to_string()
            } else {
                format!("\"{value}\"")
            }
        };

        if other_labels.is_empty() {
            return values
                .into_iter()
                .map(|value| {
                    let text = insert(&value);
                    CompletionItem::new(value, text)
                })
                .collect();
        }

        let matchers = matchers_expr(other_labels);
        let Some(total) = self.selector_size(&matchers).await else {
            return Vec::new();
        };
        let sizes = self
            .sizes(
                values
                    .iter()
                    .map(|value| format!("{{{matchers},{label_name}=\"{value}\"}}"))
                    .collect(),
            )
            .await;

        values
            .into_iter()
            .zip(sizes)
            .map(|(value, size)| {
                let detail = size.map(|size| {
                    format!(
                        "\"{value}\" label is present in ~{}/{} logs.",
                        human_file_size(size, false, 1),
                        human_file_size(total, false, 1)
                    )
                });
                CompletionItem {
                    insert_text: insert(&value),
                    label: value,
                    documentation: None,
                    detail,
                }
            })
            .collect()
    }

    /// Size of `{matchers}`. `None` when it is zero or unknown, in which case
    /// there is nothing worth suggesting.
    async fn selector_size(&self, matchers: &str) -> Option<u64> {
        let selector = format!("{{{matchers}}}");
        match self.backend.stats(&selector).await {
            Ok(0) => {
                debug!(%selector, "selector matches no data");
                None
            }
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(%selector, error = %e, "failed to fetch selector stats");
                None
            }
        }
    }

    /// Stats for every selector, at most `stats_concurrency` at a time,
    /// returned in input order.
    async fn sizes(&self, selectors: Vec<String>) -> Vec<Option<u64>> {
        let mut sizes: Vec<(usize, Option<u64>)> = stream::iter(selectors.into_iter().enumerate())
            .map(|(index, selector)| async move {
                match self.backend.stats(&selector).await {
                    Ok(bytes) => (index, Some(bytes)),
                    Err(e) => {
                        warn!(%selector, error = %e, "failed to fetch stats");
                        (index, None)
                    }
                }
            })
            .buffer_unordered(self.config.stats_concurrency.max(1))
            .collect()
            .await;

        sizes.sort_unstable_by_key(|(index, _)| *index);
        sizes.into_iter().map(|(_, size)| size).collect()
    }

    async fn after_selector(
        &self,
        log_query: &str,
        after_pipe: bool,
        has_space: bool,
    ) -> Vec<CompletionItem> {
        let prefix = format!(
            "{}{}",
            if has_space { "" } else { " " },
            if after_pipe { "" } else { "| " }
        );
        let has_parser = is_query_with_parser(log_query).query_with_parser;

        let mut completions = parser_completions(&prefix);
        if has_parser {
            for key in self.detected_keys(log_query).await {
                completions.push(CompletionItem {
                    label: format!("{key} (detected)"),
                    insert_text: format!("{prefix} {key}"),
                    documentation: Some(format!("{key} label was detected from sampled log lines.")),
                    detail: None,
                });
            }
        }
        completions.extend(formatter_completions(&prefix));

        if has_parser || (after_pipe && has_space) {
            return completions;
        }

        let mut items = line_filter_completions(after_pipe);
        items.extend(completions);
        items
    }

    async fn sample(&self, query: &str) -> Option<SampleFrame> {
        let query = query.trim_end_matches(['|', ' ']);
        match self.backend.samples(query).await {
            Ok(frames) => frames.into_iter().next(),
            Err(e) => {
                warn!(query, error = %e, "failed to fetch samples");
                None
            }
        }
    }

    async fn detected_keys(&self, log_query: &str) -> Vec<String> {
        self.sample(log_query)
            .await
            .and_then(|frame| frame.rows.into_iter().next())
            .map(|row| row.into_keys().collect())
            .unwrap_or_default()
    }

    async fn detected_values(&self, log_query: &str) -> Vec<CompletionItem> {
        let (query, label) = get_query_without_trailing_label_filter(log_query);
        if label.is_empty() {
            return Vec::new();
        }
        let Some(frame) = self.sample(&query).await else {
            return Vec::new();
        };

        let mut values: Vec<String> = Vec::new();
        for row in frame.rows {
            if let Some(value) = row.get(&label) {
                if !value.is_empty() && !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }

        values
            .into_iter()
            .map(|value| CompletionItem {
                label: format!("{value} (detected)"),
                insert_text: format!("`{value}`"),
                documentation: Some(format!("{value} value was detected from sampled log lines.")),
                detail: None,
            })
            .collect()
    }

    fn limited(&self, mut names: Vec<String>) -> Vec<String> {
        names.truncate(self.config.max_suggestions);
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SampleRow;
    use crate::completion::LabelOperator;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Scripted {
        names: Vec<String>,
        values: Vec<String>,
        stats: HashMap<String, u64>,
        rows: Vec<SampleRow>,
        sample_queries: Mutex<Vec<String>>,
        stats_calls: Mutex<usize>,
    }

    #[async_trait]
    impl LokiBackend for Scripted {
        async fn label_names(&self) -> Result<Vec<String>> {
            Ok(self.names.clone())
        }

        async fn label_names_for(&self, _labels: &[Label]) -> Result<Vec<String>> {
            Ok(self.names.clone())
        }

        async fn label_values(&self, _label: &str) -> Result<Vec<String>> {
            Ok(self.values.clone())
        }

        async fn stats(&self, selector: &str) -> Result<u64> {
            *self.stats_calls.lock().unwrap() += 1;
            self.stats
                .get(selector)
                .copied()
                .ok_or_else(|| LensError::backend(format!("no stats for {selector}")))
        }

        async fn samples(&self, query: &str) -> Result<Vec<SampleFrame>> {
            self.sample_queries.lock().unwrap().push(query.to_string());
            Ok(vec![SampleFrame {
                rows: self.rows.clone(),
            }])
        }
    }

    fn engine(backend: Scripted) -> CompletionEngine<Scripted> {
        CompletionEngine::new(backend, CompletionConfig::default())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn row(pairs: &[(&str, &str)]) -> SampleRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_label_names_without_other_labels() {
        let engine = engine(Scripted {
            names: strings(&["app", "job"]),
            ..Default::default()
        });
        let items = engine
            .complete(&Situation::InLabelSelectorNoLabelName {
                other_labels: vec![],
            })
            .await;

        assert_eq!(
            items,
            vec![CompletionItem::new("app", "app="), CompletionItem::new("job", "job=")]
        );
        assert_eq!(*engine.backend().stats_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_label_names_with_sizes() {
        let stats = HashMap::from([
            (r#"{job="api"}"#.to_string(), 2048),
            (r#"{job="api",host=~".*"}"#.to_string(), 1536),
        ]);
        let engine = engine(Scripted {
            names: strings(&["host", "job", "level"]),
            stats,
            ..Default::default()
        });
        let items = engine
            .complete(&Situation::InLabelSelectorNoLabelName {
                other_labels: vec![Label::new("job", LabelOperator::Eq, "api")],
            })
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "host");
        assert_eq!(
            items[0].detail.as_deref(),
            Some(r#""host" label is present in ~1.5 KiB/2.0 KiB logs."#)
        );
        // failed lookup keeps the candidate without annotation
        assert_eq!(items[1].label, "level");
        assert_eq!(items[1].detail, None);
    }

    #[tokio::test]
    async fn test_label_names_for_empty_selector() {
        let engine = engine(Scripted {
            names: strings(&["host"]),
            stats: HashMap::from([(r#"{job="api"}"#.to_string(), 0)]),
            ..Default::default()
        });
        let items = engine
            .complete(&Situation::InLabelSelectorNoLabelName {
                other_labels: vec![Label::new("job", LabelOperator::Eq, "api")],
            })
            .await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_label_values_quoting() {
        let engine = engine(Scripted {
            values: strings(&["api"]),
            ..Default::default()
        });
        let situation = |between_quotes| Situation::InLabelSelectorWithLabelName {
            label_name: "job".into(),
            between_quotes,
            other_labels: vec![],
        };

        let items = engine.complete(&situation(false)).await;
        assert_eq!(items, vec![CompletionItem::new("api", "\"api\"")]);
        let items = engine.complete(&situation(true)).await;
        assert_eq!(items, vec![CompletionItem::new("api", "api")]);
    }

    #[tokio::test]
    async fn test_after_selector_without_parser() {
        let engine = engine(Scripted::default());
        let items = engine
            .complete(&Situation::AfterSelector {
                log_query: r#"{job="api"}"#.into(),
                after_pipe: false,
                has_space: false,
            })
            .await;

        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                r#"|= """#,
                r#"!= """#,
                r#"|~ """#,
                r#"!~ """#,
                "json",
                "logfmt",
                "pattern",
                "regexp",
                "unpack",
                "unwrap",
                "line_format",
                "label_format"
            ]
        );
        assert_eq!(items[4].insert_text, " | json");
        assert!(engine.backend().sample_queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_after_pipe_with_space_has_no_line_filters() {
        let engine = engine(Scripted::default());
        let items = engine
            .complete(&Situation::AfterSelector {
                log_query: r#"{job="api"} |"#.into(),
                after_pipe: true,
                has_space: true,
            })
            .await;
        assert_eq!(items[0].label, "json");
        assert_eq!(items[0].insert_text, "json");
    }

    #[tokio::test]
    async fn test_after_selector_with_parser_detects_keys() {
        let engine = engine(Scripted {
            rows: vec![row(&[("level", "info"), ("status", "200")])],
            ..Default::default()
        });
        let items = engine
            .complete(&Situation::AfterSelector {
                log_query: r#"{job="api"} | json |"#.into(),
                after_pipe: true,
                has_space: false,
            })
            .await;

        let detected: Vec<&CompletionItem> =
            items.iter().filter(|i| i.label.ends_with("(detected)")).collect();
        assert_eq!(detected.len(), 2);
        assert_eq!(detected[0].label, "level (detected)");
        assert_eq!(detected[0].insert_text, "  level");
        assert!(!items.iter().any(|i| i.label.starts_with("|=")));
        assert_eq!(
            *engine.backend().sample_queries.lock().unwrap(),
            vec![r#"{job="api"} | json"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_after_logfmt_detects_keys() {
        let engine = engine(Scripted {
            rows: vec![row(&[("caller", "main.go"), ("level", "info")])],
            ..Default::default()
        });
        let items = engine
            .complete_at(r#"{job="api"} | logfmt "#, 21)
            .await;

        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"caller (detected)"), "{labels:?}");
        assert!(labels.contains(&"level (detected)"));
        assert!(!items.iter().any(|i| i.label.starts_with("|=")));
        assert_eq!(
            *engine.backend().sample_queries.lock().unwrap(),
            vec![r#"{job="api"} | logfmt"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_detected_values() {
        let engine = engine(Scripted {
            rows: vec![
                row(&[("level", "info")]),
                row(&[("level", "warn")]),
                row(&[("level", "info")]),
                row(&[("level", "")]),
                row(&[("other", "x")]),
            ],
            ..Default::default()
        });
        let items = engine
            .complete(&Situation::InLabelFilterMatcher {
                log_query: r#"{job="api"} | json | level="#.into(),
            })
            .await;

        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["info (detected)", "warn (detected)"]);
        assert_eq!(items[0].insert_text, "`info`");
        assert_eq!(
            *engine.backend().sample_queries.lock().unwrap(),
            vec![r#"{job="api"} | json"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_static_situations() {
        let engine = engine(Scripted::default());
        assert_eq!(engine.complete(&Situation::InRange).await.len(), 8);
        assert_eq!(
            engine.complete(&Situation::Empty).await,
            engine.complete(&Situation::AtRoot).await
        );
        assert!(!engine.complete(&Situation::InAggregation).await.is_empty());
        assert!(engine.complete_at(r#"{job="api"}"#, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let engine = engine(Scripted::default());
        let (handle, token) = CancelToken::new();
        handle.cancel();

        let result = engine.complete_cancellable(&Situation::AtRoot, &token).await;
        assert!(matches!(result, Err(LensError::Cancelled)));
    }

    #[tokio::test]
    async fn test_uncancelled_request_completes() {
        let engine = engine(Scripted::default());
        let (_handle, token) = CancelToken::new();
        let items = engine
            .complete_cancellable(&Situation::InRange, &token)
            .await
            .unwrap();
        assert_eq!(items.len(), 8);
    }
}
