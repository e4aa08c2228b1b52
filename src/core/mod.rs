//! Configuration and error types shared by every logql-lens module.

#![warn(missing_docs)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{BackendConfig, CompletionConfig, Config, ConfigBuilder, LogLevel, LoggingConfig};
pub use error::{LensError, Result};
