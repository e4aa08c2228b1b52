//! [`LokiBackend`] over a Grafana Loki datasource.
//!
//! Label, series and stats lookups go through the datasource resource API
//! (`/api/datasources/uid/<uid>/resources/...`); samples are a range query
//! through `/api/ds/query`.

use super::{process_labels, LokiBackend, SampleFrame, SampleRow, TimeWindow, SAMPLES_REF_ID};
use crate::completion::{matchers_expr, Label};
use crate::core::{Config, LensError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct IndexStats {
    #[serde(default)]
    bytes: u64,
}

/// HTTP client for one Loki datasource behind Grafana.
#[derive(Debug, Clone)]
pub struct GrafanaLokiClient {
    http: HttpClient,
    base_url: String,
    datasource_uid: String,
    lookback: Duration,
    sample_lines: usize,
    max_suggestions: usize,
}

impl GrafanaLokiClient {
    /// Builds a client from the backend and completion settings of `config`.
    pub fn new(config: &Config) -> Result<Self> {
        let backend = &config.backend;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            "x-datasource-uid",
            HeaderValue::from_str(&backend.datasource_uid)
                .map_err(|e| LensError::config(format!("Invalid datasource UID: {e}")))?,
        );
        headers.insert("x-grafana-org-id", HeaderValue::from(backend.org_id));
        headers.insert("x-plugin-id", HeaderValue::from_static("loki"));
        if let Some(token) = &backend.api_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| LensError::config(format!("Invalid API token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(backend.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: backend.base_url.trim_end_matches('/').to_string(),
            datasource_uid: backend.datasource_uid.clone(),
            lookback: backend.lookback,
            sample_lines: backend.sample_lines,
            max_suggestions: config.completion.max_suggestions,
        })
    }

    fn resource_url(&self, path: &str) -> String {
        format!(
            "{}/api/datasources/uid/{}/resources/{path}",
            self.base_url, self.datasource_uid
        )
    }

    fn window_params(&self) -> [(&'static str, String); 2] {
        let window = TimeWindow::last(self.lookback);
        [
            ("start", window.start_nanos().to_string()),
            ("end", window.end_nanos().to_string()),
        ]
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Vec<u8>> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LensError::BackendStatus {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = self.resource_url(path);
        debug!(%url, "loki resource request");

        let body = self.send(path, self.http.get(&url).query(params)).await?;
        serde_json::from_slice(&body).map_err(|e| LensError::decode(format!("{path}: {e}")))
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let envelope: DataEnvelope<T> = self.get_json(path, params).await?;
        Ok(envelope.data)
    }

    fn truncated(&self, mut values: Vec<String>) -> Vec<String> {
        values.truncate(self.max_suggestions);
        values
    }
}

#[async_trait]
impl LokiBackend for GrafanaLokiClient {
    async fn label_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = self.get_data("labels", &self.window_params()).await?;
        Ok(self.truncated(names))
    }

    async fn label_names_for(&self, labels: &[Label]) -> Result<Vec<String>> {
        let selector = format!("{{{}}}", matchers_expr(labels));
        let [start, end] = self.window_params();
        let params = [("match[]", selector), start, end];

        let series: Vec<SampleRow> = self.get_data("series", &params).await?;
        let processed = process_labels(&series, self.max_suggestions);
        Ok(processed
            .keys
            .into_iter()
            .filter(|key| !labels.iter().any(|l| &l.name == key))
            .collect())
    }

    async fn label_values(&self, label: &str) -> Result<Vec<String>> {
        let path = format!("label/{label}/values");
        let values: Vec<String> = self.get_data(&path, &self.window_params()).await?;
        Ok(self.truncated(values))
    }

    async fn stats(&self, selector: &str) -> Result<u64> {
        let [start, end] = self.window_params();
        let params = [("query", selector.to_string()), start, end];
        let stats: IndexStats = self.get_json("index/stats", &params).await?;
        Ok(stats.bytes)
    }

    async fn samples(&self, query: &str) -> Result<Vec<SampleFrame>> {
        let window = TimeWindow::last(self.lookback);
        let url = format!("{}/api/ds/query", self.base_url);
        let body = json!({
            "queries": [{
                "refId": SAMPLES_REF_ID,
                "datasource": { "type": "loki", "uid": self.datasource_uid },
                "expr": query,
                "queryType": "range",
                "maxLines": self.sample_lines,
                "legendFormat": "",
            }],
            "from": window.start_millis().to_string(),
            "to": window.end_millis().to_string(),
        });
        debug!(%url, query, "loki sample request");

        let bytes = self.send("ds/query", self.http.post(&url).json(&body)).await?;
        SampleFrame::from_query_response(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::LabelOperator;
    use crate::core::ConfigBuilder;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RESOURCES: &str = "/api/datasources/uid/loki-uid/resources";

    fn client(server: &MockServer) -> GrafanaLokiClient {
        let config = ConfigBuilder::new()
            .base_url(server.uri())
            .datasource_uid("loki-uid")
            .api_token("secret")
            .build()
            .unwrap();
        GrafanaLokiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_label_names_sends_datasource_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{RESOURCES}/labels")))
            .and(header("x-datasource-uid", "loki-uid"))
            .and(header("x-plugin-id", "loki"))
            .and(header("x-grafana-org-id", "1"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": ["app", "job"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let names = client(&server).label_names().await.unwrap();
        assert_eq!(names, vec!["app", "job"]);
    }

    #[tokio::test]
    async fn test_label_names_for_excludes_used_labels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{RESOURCES}/series")))
            .and(query_param("match[]", r#"{job="api"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"job": "api", "host": "h1"},
                    {"job": "api", "host": "h2", "level": "info"}
                ]
            })))
            .mount(&server)
            .await;

        let labels = [Label::new("job", LabelOperator::Eq, "api")];
        let names = client(&server).label_names_for(&labels).await.unwrap();
        assert_eq!(names, vec!["host", "level"]);
    }

    #[tokio::test]
    async fn test_label_values_and_stats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{RESOURCES}/label/job/values")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": ["api", "worker"]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{RESOURCES}/index/stats")))
            .and(query_param("query", r#"{job="api"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "streams": 2, "chunks": 4, "entries": 10, "bytes": 2048
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.label_values("job").await.unwrap(), vec!["api", "worker"]);
        assert_eq!(client.stats(r#"{job="api"}"#).await.unwrap(), 2048);
    }

    #[tokio::test]
    async fn test_samples_query_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ds/query"))
            .and(body_partial_json(serde_json::json!({
                "queries": [{
                    "refId": "samples",
                    "expr": r#"{job="api"} | json"#,
                    "queryType": "range",
                    "maxLines": 10
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {"samples": {"frames": [
                    {"data": {"values": [[{"level": "info"}]]}}
                ]}}
            })))
            .mount(&server)
            .await;

        let frames = client(&server)
            .samples(r#"{job="api"} | json"#)
            .await
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].rows[0]["level"], "info");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{RESOURCES}/labels")))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client(&server).label_names().await.unwrap_err();
        assert!(matches!(
            err,
            LensError::BackendStatus { status: 502, ref endpoint } if endpoint == "labels"
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{RESOURCES}/labels")))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server).label_names().await.unwrap_err();
        assert!(matches!(err, LensError::Decode(_)));
    }
}
