//! Error types for aidigest.
//!
//! Library crates use [`AiDigestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all aidigest operations.
#[derive(Debug, thiserror::Error)]
pub enum AiDigestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to a source or the classifier.
    #[error("network error: {0}")]
    Network(String),

    /// Feed, JSON or HTML payload could not be interpreted.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Classifier service error (transport, timeout, or response shape).
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (empty body, bad date, unknown kind, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AiDigestError>;

impl AiDigestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap any storage-layer error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = AiDigestError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = AiDigestError::validation("body is empty");
        assert!(err.to_string().contains("body is empty"));

        let err = AiDigestError::Classifier("timed out after 60s".into());
        assert_eq!(err.to_string(), "classifier error: timed out after 60s");
    }

    #[test]
    fn storage_helper_keeps_message() {
        let err = AiDigestError::storage("database is locked");
        assert!(matches!(err, AiDigestError::Storage(ref m) if m == "database is locked"));
    }
}
