//! Orchestration error types.

use thiserror::Error;
use warden_core::machine::TransitionError;
use warden_core::storage::StorageError;

/// Errors raised by the orchestration layer.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A submitted payload failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No system with the given id is registered.
    #[error("system not found: {0}")]
    SystemNotFound(String),

    /// No work item with the given id exists.
    #[error("work item not found: {0}")]
    WorkItemNotFound(String),

    /// The requested work-item state transition is not allowed.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The requested system status transition is not allowed.
    #[error("invalid system transition for {system_id}: {from} -> {to}")]
    InvalidSystemTransition {
        /// Id of the system.
        system_id: String,
        /// Status the system was in.
        from: String,
        /// Status that was requested.
        to: String,
    },

    /// The record was modified since the caller read it.
    #[error("concurrent modification of {0}; re-read and retry")]
    ConcurrencyConflict(String),

    /// Adding the edge would make the dependency graph cyclic.
    #[error("dependency cycle detected involving {0}")]
    CycleDetected(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for OrchestrationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::VersionConflict { ref id, .. } => Self::ConcurrencyConflict(id.clone()),
            other => Self::Storage(other),
        }
    }
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_maps_to_concurrency_conflict() {
        let err: OrchestrationError = StorageError::VersionConflict {
            id: "task-1".to_string(),
            expected: 1,
            found: 2,
        }
        .into();
        assert!(matches!(err, OrchestrationError::ConcurrencyConflict(id) if id == "task-1"));
    }

    #[test]
    fn test_not_found_stays_storage() {
        let err: OrchestrationError = StorageError::NotFound("task-1".to_string()).into();
        assert!(matches!(err, OrchestrationError::Storage(StorageError::NotFound(_))));
    }
}
