//! Error types for the Blobfield hub.

use thiserror::Error;

use crate::session::CapacityExceeded;

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur running the hub and its server.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value could not be parsed
    #[error("invalid configuration {key}={value:?}: {reason}")]
    Config {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The session registry is full
    #[error(transparent)]
    CapacityExceeded(#[from] CapacityExceeded),

    /// The hub task has stopped
    #[error("hub is not running")]
    HubClosed,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
