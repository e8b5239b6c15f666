//! Error types for tunein-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using tunein-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tunein-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local cache could not be decoded
    #[error("Corrupt local state: {0}")]
    CorruptLocalState(String),

    /// Remote store failure (unreachable or rejected)
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A newer load finished first; this result was discarded
    #[error("Load superseded by a newer request")]
    Superseded,
}

impl Error {
    /// Whether the operation may succeed if retried after reconnecting
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::Unreachable(_)))
    }
}
