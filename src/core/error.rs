//! Error type shared across logql-lens.

use thiserror::Error;

/// Errors raised by logql-lens.
#[derive(Error, Debug)]
pub enum LensError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend request failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// Backend answered with a non-success status
    #[error("Backend returned status {status} for {endpoint}")]
    BackendStatus {
        /// HTTP status code
        status: u16,
        /// Path of the failing request
        endpoint: String,
    },

    /// Backend response body did not have the expected shape
    #[error("Malformed backend response: {0}")]
    Decode(String),

    /// Query text could not be parsed
    #[error("Parse error: {message}")]
    Parse {
        /// What went wrong
        message: String,
    },

    /// A newer completion request superseded this one
    #[error("Completion request was superseded")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Operation exceeded its deadline
    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout {
        /// Deadline in milliseconds
        timeout_ms: u64,
    },
}

/// Result type alias for logql-lens operations
pub type Result<T> = std::result::Result<T, LensError>;

impl LensError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new backend error
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }

    /// Creates a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Returns true if retrying the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Backend(_) | Self::Timeout { .. } => true,
            Self::BackendStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Backend(_) | Self::BackendStatus { .. } | Self::Http(_) => "backend",
            Self::Decode(_) | Self::Serialization(_) => "decode",
            Self::Parse { .. } => "parse",
            Self::Cancelled => "cancelled",
            Self::Io(_) => "io",
            Self::Timeout { .. } => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = LensError::backend("connection refused");
        assert_eq!(err.to_string(), "Backend error: connection refused");
        assert_eq!(err.category(), "backend");
    }

    #[test]
    fn test_error_recoverability() {
        assert!(LensError::backend("connection failed").is_recoverable());
        assert!(!LensError::config("invalid config").is_recoverable());
        assert!(LensError::Timeout { timeout_ms: 5000 }.is_recoverable());
        assert!(!LensError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_status_error() {
        let err = LensError::BackendStatus {
            status: 503,
            endpoint: "/labels".to_string(),
        };
        assert_eq!(err.to_string(), "Backend returned status 503 for /labels");
        assert!(err.is_recoverable());

        let err = LensError::BackendStatus {
            status: 401,
            endpoint: "/labels".to_string(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_decode_category() {
        let err = LensError::decode("missing results.samples");
        assert_eq!(err.category(), "decode");
        assert_eq!(err.to_string(), "Malformed backend response: missing results.samples");
    }
}
