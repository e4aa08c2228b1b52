//! Common test utilities and fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use logql_lens::backend::{LokiBackend, SampleFrame, SampleRow};
use logql_lens::completion::Label;
use logql_lens::core::{LensError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Scripted in-memory backend. Every call is recorded.
#[derive(Default)]
pub struct FakeBackend {
    names: Vec<String>,
    names_for: Option<Vec<String>>,
    values: HashMap<String, Vec<String>>,
    stats: HashMap<String, u64>,
    rows: Vec<SampleRow>,
    delay: Option<Duration>,
    unavailable: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label_names(mut self, names: &[&str]) -> Self {
        self.names = names.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_label_names_for(mut self, names: &[&str]) -> Self {
        self.names_for = Some(names.iter().map(ToString::to_string).collect());
        self
    }

    pub fn with_label_values(mut self, label: &str, values: &[&str]) -> Self {
        self.values.insert(
            label.to_string(),
            values.iter().map(ToString::to_string).collect(),
        );
        self
    }

    pub fn with_stats(mut self, selector: &str, bytes: u64) -> Self {
        self.stats.insert(selector.to_string(), bytes);
        self
    }

    pub fn with_row(mut self, pairs: &[(&str, &str)]) -> Self {
        self.rows.push(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    /// Every call waits this long before answering.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call fails.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Calls so far, as `method(argument)`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable {
            return Err(LensError::backend(format!("{call} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl LokiBackend for FakeBackend {
    async fn label_names(&self) -> Result<Vec<String>> {
        self.enter("label_names()".to_string()).await?;
        Ok(self.names.clone())
    }

    async fn label_names_for(&self, labels: &[Label]) -> Result<Vec<String>> {
        let used: Vec<&str> = labels.iter().map(|l| l.name.as_str()).collect();
        self.enter(format!("label_names_for({})", used.join(","))).await?;
        let names = self.names_for.as_ref().unwrap_or(&self.names);
        Ok(names
            .iter()
            .filter(|n| !used.contains(&n.as_str()))
            .cloned()
            .collect())
    }

    async fn label_values(&self, label: &str) -> Result<Vec<String>> {
        self.enter(format!("label_values({label})")).await?;
        Ok(self.values.get(label).cloned().unwrap_or_default())
    }

    async fn stats(&self, selector: &str) -> Result<u64> {
        self.enter(format!("stats({selector})")).await?;
        self.stats
            .get(selector)
            .copied()
            .ok_or_else(|| LensError::backend(format!("no stats for {selector}")))
    }

    async fn samples(&self, query: &str) -> Result<Vec<SampleFrame>> {
        self.enter(format!("samples({query})")).await?;
        Ok(vec![SampleFrame {
            rows: self.rows.clone(),
        }])
    }
}
