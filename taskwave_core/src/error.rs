//! Error types shared across the core data model.

use thiserror::Error;

/// Error types for core data-model and persistence operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Failed to serialize or deserialize a persisted structure
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure in a blob store backend
    #[error("Store I/O failed: {0}")]
    StoreIo(#[from] std::io::Error),

    /// Blob store rejected an invalid key
    #[error("Invalid store key: {0}")]
    InvalidKey(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
