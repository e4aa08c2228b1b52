//! Command-line interface for logql-lens.
//!
//! Offline commands (`situation`, `visual`, `validate`, `inspect`) only parse
//! the query. `complete` and `check-config` also need a Grafana Loki
//! datasource and therefore a valid configuration.

use crate::backend::GrafanaLokiClient;
use crate::builder::{build_visual_query, render_visual_query};
use crate::completion::{classify, CompletionEngine};
use crate::core::config::{ConfigBuilder, LoggingConfig};
use crate::core::{Config, LensError, Result};
use crate::logql::validate_query;
use crate::query::{
    get_log_query_from_metrics_query, get_parser_from_query, get_stream_selectors_from_query,
    identify_query, is_logs_query, is_query_pipeline_error_filtering, is_query_with_label_filter,
    is_query_with_label_format, is_query_with_line_filter, is_query_with_parser, is_valid_query,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

/// LogQL completion, validation and visual-query tooling for Loki.
#[derive(Parser, Debug)]
#[command(name = "logql-lens")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/logql-lens/config.yaml)
    #[arg(short, long, env = "LOGQL_LENS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Grafana base URL
    #[arg(long, env = "LOGQL_LENS_URL", global = true)]
    pub url: Option<String>,

    /// UID of the Loki datasource in Grafana
    #[arg(long, env = "LOGQL_LENS_DATASOURCE_UID", global = true)]
    pub datasource_uid: Option<String>,

    /// Grafana API token
    #[arg(long, env = "LOGQL_LENS_API_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "LOGQL_LENS_DEBUG", global = true)]
    pub debug: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Classify the cursor position and print completion items
    Complete {
        /// LogQL text
        query: String,
        /// Cursor byte offset (default: end of the query)
        #[arg(long)]
        cursor: Option<usize>,
    },
    /// Print the completion situation at the cursor
    Situation {
        /// LogQL text
        query: String,
        /// Cursor byte offset (default: end of the query)
        #[arg(long)]
        cursor: Option<usize>,
    },
    /// Build the visual query and render it back to LogQL
    Visual {
        /// LogQL text
        query: String,
    },
    /// Report syntax errors
    Validate {
        /// LogQL text
        query: String,
    },
    /// Print what the query contains
    Inspect {
        /// LogQL text
        query: String,
    },
    /// Validate configuration and exit
    CheckConfig,
}

impl Command {
    /// Whether the command talks to the backend.
    pub fn needs_backend(&self) -> bool {
        matches!(self, Command::Complete { .. } | Command::CheckConfig)
    }
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments and environment variables (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("logql-lens").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/logql-lens/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::debug!("Loaded configuration from: {:?}", config_path);
            }
            Err(e) if self.config.is_some() => {
                return Err(LensError::config(format!(
                    "Failed to read config file {config_path:?}: {e}"
                )));
            }
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            }
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(url) = &self.url {
            builder = builder.base_url(url);
        }
        if let Some(uid) = &self.datasource_uid {
            builder = builder.datasource_uid(uid);
        }
        if let Some(token) = &self.token {
            builder = builder.api_token(token);
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging. `--debug` wins over `LOGQL_LENS_LOG_LEVEL`, which
    /// wins over the config file.
    pub fn init_logging(&self, logging: Option<&LoggingConfig>) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let configured = logging.map_or("warn", |l| l.level.as_str());
        let env_log_level =
            std::env::var("LOGQL_LENS_LOG_LEVEL").unwrap_or_else(|_| configured.to_string());
        let log_level = if self.debug {
            "debug"
        } else {
            env_log_level.as_str()
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let structured = logging.is_some_and(|l| l.structured);
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(structured)
            .with_thread_ids(structured)
            .with_line_number(structured)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| LensError::config(format!("Failed to initialize logging: {e}")))?;

        Ok(())
    }
}

/// Summary printed by `inspect`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySummary {
    /// Parses without errors.
    pub valid: bool,
    /// No metric expression anywhere.
    pub logs_query: bool,
    /// Number of parser stages.
    pub parser_count: usize,
    /// First parser stage.
    pub parser: Option<String>,
    /// Filters on `__error__`.
    pub error_filtering: bool,
    /// Has a `label_format` stage.
    pub label_format: bool,
    /// Has a line filter.
    pub line_filter: bool,
    /// Has a label filter.
    pub label_filter: bool,
    /// Every stream selector.
    pub stream_selectors: Vec<String>,
    /// Logs part of the query.
    pub log_query: String,
    /// Longest valid query found in the text.
    pub identified: String,
}

impl QuerySummary {
    /// Runs every introspection on `query`.
    pub fn of(query: &str) -> Self {
        Self {
            valid: is_valid_query(query),
            logs_query: is_logs_query(query),
            parser_count: is_query_with_parser(query).parser_count,
            parser: get_parser_from_query(query),
            error_filtering: is_query_pipeline_error_filtering(query),
            label_format: is_query_with_label_format(query),
            line_filter: is_query_with_line_filter(query),
            label_filter: is_query_with_label_filter(query),
            stream_selectors: get_stream_selectors_from_query(query),
            log_query: get_log_query_from_metrics_query(query),
            identified: identify_query(query),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Execute the logql-lens command.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = if cli.command.needs_backend() {
        Some(cli.load_config().await?)
    } else {
        None
    };
    cli.init_logging(config.as_ref().map(|c| &c.logging))?;

    match (&cli.command, config) {
        (Command::CheckConfig, Some(config)) => {
            println!("Configuration is valid!");
            println!("  Grafana URL: {}", config.backend.base_url);
            println!("  Datasource UID: {}", config.backend.datasource_uid);
            println!(
                "  API token: {}",
                if config.backend.api_token.is_some() { "set" } else { "not set" }
            );
            println!("  Lookback: {:?}", config.backend.lookback);
            println!("  Stats concurrency: {}", config.completion.stats_concurrency);
            Ok(())
        }
        (Command::Complete { query, cursor }, Some(config)) => {
            let cursor = cursor.unwrap_or(query.len());
            let situation = classify(query, cursor);
            tracing::debug!(?situation, cursor, "classified cursor");

            let engine = CompletionEngine::new(GrafanaLokiClient::new(&config)?, config.completion);
            let items = match &situation {
                Some(situation) => engine.complete(situation).await,
                None => Vec::new(),
            };
            print_json(&serde_json::json!({ "situation": situation, "items": items }))
        }
        (Command::Situation { query, cursor }, _) => {
            print_json(&classify(query, cursor.unwrap_or(query.len())))
        }
        (Command::Visual { query }, _) => {
            let result = build_visual_query(query);
            let rendered = render_visual_query(&result.query);
            print_json(&serde_json::json!({
                "query": result.query,
                "errors": result.errors,
                "rendered": rendered,
            }))
        }
        (Command::Validate { query }, _) => print_json(&validate_query(query)),
        (Command::Inspect { query }, _) => print_json(&QuerySummary::of(query)),
        (command, None) => Err(LensError::config(format!(
            "{command:?} requires a configuration"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("logql-lens").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_subcommands() {
        let parsed = cli(&["complete", "{job=", "--cursor", "5"]);
        assert_eq!(
            parsed.command,
            Command::Complete {
                query: "{job=".into(),
                cursor: Some(5)
            }
        );
        assert!(parsed.command.needs_backend());

        let parsed = cli(&["visual", r#"{a="b"}"#]);
        assert!(!parsed.command.needs_backend());
        assert!(cli(&["check-config"]).command.needs_backend());
    }

    #[test]
    fn test_global_overrides() {
        let parsed = cli(&["--url", "http://grafana:3000", "--datasource-uid", "loki", "check-config"]);
        let config = parsed.build_config_from_args(ConfigBuilder::new()).unwrap();
        assert_eq!(config.backend.base_url, "http://grafana:3000");
        assert_eq!(config.backend.datasource_uid, "loki");
    }

    #[test]
    fn test_missing_datasource_is_config_error() {
        let mut parsed = cli(&["check-config"]);
        parsed.datasource_uid = None;
        let err = parsed.build_config_from_args(ConfigBuilder::new()).unwrap_err();
        assert!(matches!(err, LensError::Config(_)));
    }

    #[test]
    fn test_query_summary() {
        let summary = QuerySummary::of(r#"sum(rate({job="api"} | json | __error__="" [5m]))"#);
        assert!(summary.valid);
        assert!(!summary.logs_query);
        assert_eq!(summary.parser.as_deref(), Some("json"));
        assert!(summary.error_filtering);
        assert_eq!(summary.stream_selectors, vec![r#"{job="api"}"#]);
        assert_eq!(summary.log_query, r#"{job="api"}| json | __error__="""#);
    }
}
