//! Error types shared across the iSamples crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, IsbError>;

/// Shared error type
#[derive(Error, Debug)]
pub enum IsbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
