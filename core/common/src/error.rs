//! Common error types for Harbor.

use thiserror::Error;

/// Top-level error type for Harbor operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network request could not complete (offline, DNS, connection reset).
    #[error("Network error: {0}")]
    Network(String),

    /// Cache or queue storage is unreachable or rejected the operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Work was abandoned before it completed (task aborted or recycled).
    #[error("Aborted: {0}")]
    Aborted(String),
}

impl Error {
    /// Whether the failure came from the network rather than local state.
    ///
    /// Network failures are recovered locally by the strategies; everything
    /// else points at storage or caller bugs.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
