//! Backend contract used by the completion engine.
//!
//! [`LokiBackend`] abstracts label, stats and sample lookups so completion
//! logic can run against Grafana ([`GrafanaLokiClient`]) or an in-memory
//! fake in tests.

pub mod client;

use crate::completion::Label;
use crate::core::{LensError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

pub use client::GrafanaLokiClient;

/// One sampled log line: field name to value, ordered by field name.
pub type SampleRow = BTreeMap<String, String>;

/// A data frame returned by a sample query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleFrame {
    /// Label sets of the sampled lines, in response order.
    pub rows: Vec<SampleRow>,
}

impl SampleFrame {
    /// Decodes the frames of the `samples` result of an `/api/ds/query`
    /// response.
    ///
    /// A frame's rows are the first value column, an array of label objects.
    /// A response without a `samples` result has no frames.
    pub fn from_query_response(body: &[u8]) -> Result<Vec<SampleFrame>> {
        let response: QueryResponse = serde_json::from_slice(body)
            .map_err(|e| LensError::decode(format!("sample response: {e}")))?;

        let Some(result) = response.results.get(SAMPLES_REF_ID) else {
            return Ok(Vec::new());
        };

        result
            .frames
            .iter()
            .map(|frame| {
                let rows = match frame.data.values.first() {
                    Some(column) => serde_json::from_value(column.clone())
                        .map_err(|e| LensError::decode(format!("sample rows: {e}")))?,
                    None => Vec::new(),
                };
                Ok(SampleFrame { rows })
            })
            .collect()
    }
}

pub(crate) const SAMPLES_REF_ID: &str = "samples";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: HashMap<String, QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    frames: Vec<RawFrame>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    data: RawFrameData,
}

#[derive(Debug, Deserialize)]
struct RawFrameData {
    #[serde(default)]
    values: Vec<serde_json::Value>,
}

/// Source of label names, label values, byte statistics and log samples.
#[async_trait]
pub trait LokiBackend: Send + Sync {
    /// Every label name known in the lookback window.
    async fn label_names(&self) -> Result<Vec<String>>;

    /// Label names of series matching `labels`, minus the names in `labels`.
    async fn label_names_for(&self, labels: &[Label]) -> Result<Vec<String>>;

    /// Values of `label` in the lookback window.
    async fn label_values(&self, label: &str) -> Result<Vec<String>>;

    /// Total bytes matched by a stream selector in the lookback window.
    async fn stats(&self, selector: &str) -> Result<u64>;

    /// A few log lines matching `query`.
    async fn samples(&self, query: &str) -> Result<Vec<SampleFrame>>;
}

#[async_trait]
impl<T: LokiBackend + ?Sized> LokiBackend for Arc<T> {
    async fn label_names(&self) -> Result<Vec<String>> {
        (**self).label_names().await
    }

    async fn label_names_for(&self, labels: &[Label]) -> Result<Vec<String>> {
        (**self).label_names_for(labels).await
    }

    async fn label_values(&self, label: &str) -> Result<Vec<String>> {
        (**self).label_values(label).await
    }

    async fn stats(&self, selector: &str) -> Result<u64> {
        (**self).stats(selector).await
    }

    async fn samples(&self, query: &str) -> Result<Vec<SampleFrame>> {
        (**self).samples(query).await
    }
}

/// Label names and their distinct values collected from series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedLabels {
    /// Label names in first-seen order.
    pub keys: Vec<String>,
    /// Distinct values per label name, in first-seen order.
    pub values: HashMap<String, Vec<String>>,
}

/// Collects label names and values from a series response.
///
/// `__name__` is dropped; both names and per-name values are capped at
/// `limit`.
pub fn process_labels(series: &[SampleRow], limit: usize) -> ProcessedLabels {
    let mut processed = ProcessedLabels::default();

    for (key, value) in series.iter().flatten() {
        if key == "__name__" {
            continue;
        }
        if !processed.values.contains_key(key) {
            if processed.keys.len() >= limit {
                continue;
            }
            processed.keys.push(key.clone());
        }
        let values = processed.values.entry(key.clone()).or_default();
        if values.len() < limit && !values.contains(value) {
            values.push(value.clone());
        }
    }

    processed
}

/// Query window ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Window start.
    pub start: DateTime<Utc>,
    /// Window end.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// `now - lookback .. now`.
    pub fn last(lookback: Duration) -> Self {
        let end = Utc::now();
        let lookback = chrono::Duration::from_std(lookback).unwrap_or(chrono::Duration::hours(1));
        Self {
            start: end - lookback,
            end,
        }
    }

    /// Start in Unix nanoseconds.
    pub fn start_nanos(&self) -> i64 {
        self.start.timestamp_nanos_opt().unwrap_or_default()
    }

    /// End in Unix nanoseconds.
    pub fn end_nanos(&self) -> i64 {
        self.end.timestamp_nanos_opt().unwrap_or_default()
    }

    /// Start in Unix milliseconds.
    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// End in Unix milliseconds.
    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }
}
