use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide `Result` type using [`ExportError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for export operations.
///
/// Each export surfaces exactly one of these. Job deletion failures are
/// never turned into an `ExportError`.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The service rejected the token (HTTP 401).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The token is valid but lacks permission (HTTP 403).
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// A job or endpoint does not exist (HTTP 404 or missing job entry).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request, unexpected status, or a response we could not understand.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The search job reached the FAILED dispatch state.
    #[error("Search job failed: {0}")]
    JobFailed(String),

    /// Cooperative cancellation was observed mid-pipeline.
    #[error("Export cancelled")]
    Cancelled,

    /// Invalid connection or export settings.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration file errors.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Network-level failure talking to the search service.
    #[error("Request failed during {operation}: {source}")]
    Transport {
        /// Remote operation that was in flight.
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Failure writing to the output sink.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Output path, or `<stdout>`.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failure encoding a structured record.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML for our schema.
    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    /// A field holds a value outside its allowed range.
    #[error("Invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },
}

impl ExportError {
    /// Creates a transport error for the named remote operation.
    pub fn transport(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { operation, source }
    }

    /// Creates an I/O error tied to an output path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Cancelled)
    }

    /// Process exit code for this error.
    ///
    /// Cancellation uses the conventional 128 + SIGINT.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExportError::Cancelled => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ExportError::NotFound("resource not found during status".into());
        assert_eq!(err.to_string(), "Not found: resource not found during status");

        let err = ExportError::JobFailed("boom".into());
        assert_eq!(err.to_string(), "Search job failed: boom");

        let err = ExportError::Config(ConfigError::InvalidValue {
            field: "export.page_size".into(),
            value: "0".into(),
        });
        assert!(err.to_string().contains("export.page_size"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExportError::Cancelled.exit_code(), 130);
        assert!(ExportError::Cancelled.is_cancelled());
        assert_eq!(ExportError::Protocol("x".into()).exit_code(), 1);
        assert!(!ExportError::Protocol("x".into()).is_cancelled());
    }

    #[test]
    fn test_io_error_includes_path() {
        let err = ExportError::io(
            "/tmp/out.csv",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/out.csv"));
    }
}
