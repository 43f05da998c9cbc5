//! Storage error types.

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("core error: {0}")]
    Core(#[from] primflow_core::CoreError),
}

impl StorageError {
    /// Returns the wire error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::InvalidState(_) => "INVALID_STATE",
            StorageError::Core(e) => e.error_code(),
            StorageError::Json(_) => "BAD_REQUEST",
            StorageError::Io(_) | StorageError::Corruption(_) => "STORAGE_ERROR",
        }
    }
}
