//! Error types for the on-call report tool.
//!
//! Library crates use [`ReportError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all report operations.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Configuration loading or validation error (bad dates, bad regex, missing credential).
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to an upstream service.
    #[error("network error: {0}")]
    Network(String),

    /// Upstream service answered with a non-success status.
    #[error("{service} API error (HTTP {status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// Response payload or input text could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Markdown-to-XHTML conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Publishing the converted report failed.
    #[error("publish error: {0}")]
    Publish(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReportError>;

impl ReportError {
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

    /// Create an API error for a non-success upstream response.
    pub fn api(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            service,
            status,
            message: message.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
