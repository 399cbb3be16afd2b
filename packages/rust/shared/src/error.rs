//! Error types for feedsync.
//!
//! Library crates use [`FeedSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all feedsync operations.
#[derive(Debug, thiserror::Error)]
pub enum FeedSyncError {
    /// Configuration error: unknown network variant, missing site, bad config file.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/transport failure while fetching a feed.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Malformed feed payload (wrong top-level shape, undecodable encoding).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Any failure reported by the store.
    #[error("store error: {0}")]
    Store(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unsupported mutation, invalid identifier, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FeedSyncError>;

impl FeedSyncError {
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

    /// Short tag naming the failure class, used in logs and run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Fetch(_) => "fetch",
            Self::Parse { .. } => "parse",
            Self::Store(_) => "store",
            Self::Io { .. } => "io",
            Self::Validation { .. } => "validation",
        }
    }
}
