//! Storage error types.

use thiserror::Error;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A record with the same id already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The record was modified since the caller read it.
    #[error("version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict {
        /// Id of the contested record.
        id: String,
        /// Version the caller based its update on.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },

    /// The record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
