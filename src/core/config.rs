//! Configuration management for logql-lens.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by the CLI layer)
//! - Validation and defaults
//!
//! Nothing backend-specific is compiled in: the datasource UID and API token
//! always come from the config file, the environment or the command line.

use crate::core::{LensError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete configuration for logql-lens
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Grafana/Loki backend configuration
    pub backend: BackendConfig,
    /// Completion engine configuration
    pub completion: CompletionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Grafana base URL, e.g. `http://localhost:3000`
    pub base_url: String,
    /// UID of the Loki datasource inside Grafana
    pub datasource_uid: String,
    /// Bearer token sent with every request
    pub api_token: Option<String>,
    /// Value of the `x-grafana-org-id` header
    pub org_id: u32,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// How far back label, stats and sample lookups reach
    #[serde(with = "humantime_serde")]
    pub lookback: Duration,
    /// `maxLines` for sample queries
    pub sample_lines: usize,
}

/// Completion engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Maximum number of concurrent stats requests per completion
    pub stats_concurrency: usize,
    /// Cap applied to label names and values returned by the backend
    pub max_suggestions: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[allow(missing_docs)]
    Trace,
    #[allow(missing_docs)]
    Debug,
    #[allow(missing_docs)]
    Info,
    #[allow(missing_docs)]
    Warn,
    #[allow(missing_docs)]
    Error,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            datasource_uid: String::new(),
            api_token: None,
            org_id: 1,
            timeout: Duration::from_secs(10),
            lookback: Duration::from_secs(3600),
            sample_lines: 10,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            stats_concurrency: 8,
            max_suggestions: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            structured: false,
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let backend = &self.backend;

        if backend.base_url.trim().is_empty() {
            return Err(LensError::config("backend.base_url must not be empty"));
        }
        let url = reqwest::Url::parse(&backend.base_url).map_err(|e| {
            LensError::config(format!("Invalid backend.base_url {:?}: {}", backend.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LensError::config(format!(
                "backend.base_url must use http or https, got {}",
                url.scheme()
            )));
        }

        if backend.datasource_uid.trim().is_empty() {
            return Err(LensError::config(
                "backend.datasource_uid must be set (config file, LOGQL_LENS_DATASOURCE_UID or --datasource-uid)",
            ));
        }

        if backend.lookback.is_zero() {
            return Err(LensError::config("backend.lookback must be greater than zero"));
        }

        if backend.timeout.is_zero() {
            return Err(LensError::config("backend.timeout must be greater than zero"));
        }

        if backend.sample_lines == 0 {
            return Err(LensError::config("backend.sample_lines must be at least 1"));
        }

        if self.completion.stats_concurrency == 0 {
            return Err(LensError::config("completion.stats_concurrency must be at least 1"));
        }

        if self.completion.max_suggestions == 0 {
            return Err(LensError::config("completion.max_suggestions must be at least 1"));
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| LensError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set the Grafana base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend.base_url = url.into();
        self
    }

    /// Set the Loki datasource UID
    pub fn datasource_uid(mut self, uid: impl Into<String>) -> Self {
        self.config.backend.datasource_uid = uid.into();
        self
    }

    /// Set the API token
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.backend.api_token = Some(token.into());
        self
    }

    /// Set the lookback window
    pub fn lookback(mut self, lookback: Duration) -> Self {
        self.config.backend.lookback = lookback;
        self
    }

    /// Set the stats fan-out width
    pub fn stats_concurrency(mut self, concurrency: usize) -> Self {
        self.config.completion.stats_concurrency = concurrency;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.backend.datasource_uid = "loki".to_string();
        config
    }

    #[test]
    fn test_default_config_requires_datasource() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("datasource_uid"));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = valid();
        config.backend.base_url = "ftp://grafana".to_string();
        assert!(config.validate().is_err());

        config.backend.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.backend.base_url = "https://grafana.example.com".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = valid();
        config.completion.stats_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.backend.sample_lines = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.backend.lookback = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .base_url("http://grafana:3000")
            .datasource_uid("P8E80F9AEF21F6940")
            .api_token("glsa_test")
            .stats_concurrency(2)
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.backend.base_url, "http://grafana:3000");
        assert_eq!(config.backend.datasource_uid, "P8E80F9AEF21F6940");
        assert_eq!(config.backend.api_token.as_deref(), Some("glsa_test"));
        assert_eq!(config.completion.stats_concurrency, 2);
        assert!(config.debug);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
backend:
  base_url: "https://grafana.internal"
  datasource_uid: loki-prod
  org_id: 3
  lookback: 30m
  timeout: 5s
completion:
  max_suggestions: 50
logging:
  level: debug
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.backend.datasource_uid, "loki-prod");
        assert_eq!(config.backend.org_id, 3);
        assert_eq!(config.backend.lookback, Duration::from_secs(1800));
        assert_eq!(config.backend.timeout, Duration::from_secs(5));
        assert_eq!(config.backend.sample_lines, 10);
        assert_eq!(config.completion.max_suggestions, 50);
        assert_eq!(config.completion.stats_concurrency, 8);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }
}
