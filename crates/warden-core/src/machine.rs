//! Shared work-item state machine.
//!
//! Tasks, decisions, and optimizations each have their own status enum, but
//! transitions are validated through one helper so the terminal-state rule
//! (a work item never transitions out of a terminal state) is enforced in a
//! single place instead of three.

use crate::models::{
    DecisionStatus, OptimizationStatus, TaskStatus, WorkItem, WorkItemKind, WorkItemPayload,
};
use thiserror::Error;
use tracing::{debug, error};

/// Errors raised by invalid state transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {kind} transition for {item_id}: {from} -> {to}")]
pub struct TransitionError {
    /// Id of the work item.
    pub item_id: String,
    /// Kind of the work item.
    pub kind: WorkItemKind,
    /// Status the item was in.
    pub from: String,
    /// Status that was requested.
    pub to: String,
}

/// Status enum of one work-item kind.
pub trait WorkItemState: Copy + Eq + std::fmt::Debug {
    /// The kind this status belongs to.
    const KIND: WorkItemKind;

    /// Whether this status is terminal.
    fn is_terminal(self) -> bool;

    /// Checks if this status can transition to the given status.
    fn can_transition_to(self, to: Self) -> bool;
}

impl WorkItemState for TaskStatus {
    const KIND: WorkItemKind = WorkItemKind::Task;

    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[allow(clippy::match_same_arms)] // Each arm represents a distinct transition rule
    fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            // Pending: becomes eligible or is cancelled
            (Self::Pending, Self::Queued | Self::Cancelled) => true,
            // Queued: picked up by the dispatcher or cancelled
            (Self::Queued, Self::Running | Self::Cancelled) => true,
            // Running: finishes, fails into the retry path, times out, pauses,
            // or is taken down by a delivered cancellation request
            (Self::Running, Self::Completed | Self::Failed | Self::Retrying | Self::Timeout | Self::Paused | Self::Cancelled) => true,
            // Paused: resumes or is cancelled
            (Self::Paused, Self::Running | Self::Cancelled) => true,
            // Retrying: re-queued once the backoff elapses, or cancelled
            (Self::Retrying, Self::Queued | Self::Cancelled) => true,
            // Timeout is a failure for retry purposes
            (Self::Timeout, Self::Retrying | Self::Failed) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }
}

impl WorkItemState for DecisionStatus {
    const KIND: WorkItemKind = WorkItemKind::Decision;

    fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::RolledBack)
    }

    fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Pending, Self::Approved | Self::Failed | Self::Escalated) => true,
            (Self::Approved, Self::Executed | Self::Failed | Self::Escalated) => true,
            // An executed decision can only be rolled back
            (Self::Executed, Self::RolledBack) => true,
            // Escalated decisions re-enter the flow after human review
            (Self::Escalated, Self::Approved | Self::Failed) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }
}

impl WorkItemState for OptimizationStatus {
    const KIND: WorkItemKind = WorkItemKind::Optimization;

    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Analyzing, Self::Planning | Self::Aborted) => true,
            (Self::Planning, Self::Implementing | Self::Aborted) => true,
            (Self::Implementing, Self::Testing | Self::Aborted) => true,
            (Self::Testing, Self::Completed | Self::Aborted) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }
}

/// Validates a transition, returning the new status on success.
///
/// # Arguments
/// * `item_id` - The work item id (for logging and errors)
/// * `from` - The status the caller read
/// * `to` - The requested status
///
/// # Errors
/// Returns `TransitionError` if the transition is not in the table for this
/// kind, including any attempt to leave a terminal state.
pub fn transition<S: WorkItemState>(item_id: &str, from: S, to: S) -> Result<S, TransitionError> {
    if !from.can_transition_to(to) {
        error!(
            item_id = %item_id,
            kind = %S::KIND,
            from = ?from,
            to = ?to,
            "Invalid state transition"
        );
        return Err(TransitionError {
            item_id: item_id.to_string(),
            kind: S::KIND,
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        });
    }

    debug!(
        item_id = %item_id,
        kind = %S::KIND,
        from = ?from,
        to = ?to,
        "State transition"
    );
    Ok(to)
}

/// Whether the item has reached any terminal status.
#[must_use]
pub fn is_item_settled(item: &WorkItem) -> bool {
    match &item.payload {
        WorkItemPayload::Task(t) => t.status.is_terminal(),
        // An executed decision is settled even though rollback remains legal.
        WorkItemPayload::Decision(d) => {
            d.status.is_terminal() || d.status == DecisionStatus::Executed
        }
        WorkItemPayload::Optimization(o) => o.status.is_terminal(),
    }
}

/// Whether the item finished in its successful terminal status.
#[must_use]
pub fn is_item_successful(item: &WorkItem) -> bool {
    match &item.payload {
        WorkItemPayload::Task(t) => t.status == TaskStatus::Completed,
        WorkItemPayload::Decision(d) => d.status == DecisionStatus::Executed,
        WorkItemPayload::Optimization(o) => o.status == OptimizationStatus::Completed,
    }
}

/// Whether the item finished in a failed terminal status.
#[must_use]
pub fn is_item_failed(item: &WorkItem) -> bool {
    match &item.payload {
        WorkItemPayload::Task(t) => {
            matches!(t.status, TaskStatus::Failed | TaskStatus::Cancelled)
        }
        WorkItemPayload::Decision(d) => {
            matches!(d.status, DecisionStatus::Failed | DecisionStatus::RolledBack)
        }
        WorkItemPayload::Optimization(o) => o.status == OptimizationStatus::Aborted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_happy_path() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Queued));
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn test_task_retry_path() {
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Retrying));
        assert!(TaskStatus::Retrying.can_transition_to(TaskStatus::Queued));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Timeout));
        assert!(TaskStatus::Timeout.can_transition_to(TaskStatus::Retrying));
        assert!(TaskStatus::Timeout.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_task_terminal_states_are_sticky() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for target in [
                TaskStatus::Pending,
                TaskStatus::Queued,
                TaskStatus::Running,
                TaskStatus::Retrying,
                TaskStatus::Timeout,
            ] {
                assert!(!terminal.can_transition_to(target), "{terminal:?} -> {target:?}");
            }
        }
    }

    #[test]
    fn test_task_cancel_paths() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Cancelled));
        // Cooperative cancellation of in-flight work lands here via the sweep.
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Cancelled));
        assert!(!TaskStatus::Timeout.can_transition_to(TaskStatus::Cancelled));
    }

    #[test]
    fn test_decision_transitions() {
        assert!(DecisionStatus::Pending.can_transition_to(DecisionStatus::Approved));
        assert!(DecisionStatus::Approved.can_transition_to(DecisionStatus::Executed));
        assert!(DecisionStatus::Executed.can_transition_to(DecisionStatus::RolledBack));
        assert!(DecisionStatus::Pending.can_transition_to(DecisionStatus::Escalated));
        assert!(DecisionStatus::Escalated.can_transition_to(DecisionStatus::Approved));

        assert!(!DecisionStatus::Pending.can_transition_to(DecisionStatus::Executed));
        assert!(!DecisionStatus::RolledBack.can_transition_to(DecisionStatus::Approved));
        assert!(DecisionStatus::RolledBack.is_terminal());
        assert!(DecisionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_optimization_lifecycle_is_linear() {
        assert!(OptimizationStatus::Analyzing.can_transition_to(OptimizationStatus::Planning));
        assert!(OptimizationStatus::Planning.can_transition_to(OptimizationStatus::Implementing));
        assert!(OptimizationStatus::Implementing.can_transition_to(OptimizationStatus::Testing));
        assert!(OptimizationStatus::Testing.can_transition_to(OptimizationStatus::Completed));

        // No skipping the simulation-gated implementing phase
        assert!(!OptimizationStatus::Analyzing.can_transition_to(OptimizationStatus::Implementing));
        assert!(!OptimizationStatus::Planning.can_transition_to(OptimizationStatus::Testing));

        for phase in [
            OptimizationStatus::Analyzing,
            OptimizationStatus::Planning,
            OptimizationStatus::Implementing,
            OptimizationStatus::Testing,
        ] {
            assert!(phase.can_transition_to(OptimizationStatus::Aborted));
        }
        assert!(!OptimizationStatus::Completed.can_transition_to(OptimizationStatus::Aborted));
    }

    #[test]
    fn test_transition_helper_accepts_valid() {
        let next = transition("task-1", TaskStatus::Queued, TaskStatus::Running).unwrap();
        assert_eq!(next, TaskStatus::Running);
    }

    #[test]
    fn test_transition_helper_rejects_invalid() {
        let err = transition("task-1", TaskStatus::Completed, TaskStatus::Running).unwrap_err();
        assert_eq!(err.kind, WorkItemKind::Task);
        assert_eq!(err.from, "Completed");
        assert_eq!(err.to, "Running");
        assert!(err.to_string().contains("task-1"));
    }

    #[test]
    fn test_same_state_is_noop() {
        assert!(transition("task-1", TaskStatus::Running, TaskStatus::Running).is_ok());
    }

    #[test]
    fn test_item_outcome_helpers() {
        use crate::models::{Priority, TaskItem, WorkItem};
        use chrono::{DateTime, Utc};

        let mut item = WorkItem::new(
            "task-1".to_string(),
            "sys-1".to_string(),
            Priority::Normal,
            WorkItemPayload::Task(TaskItem::new("build".to_string(), 3)),
            DateTime::<Utc>::UNIX_EPOCH,
        );
        assert!(!is_item_settled(&item));
        assert!(!is_item_successful(&item));

        item.as_task_mut().unwrap().status = TaskStatus::Completed;
        assert!(is_item_settled(&item));
        assert!(is_item_successful(&item));
        assert!(!is_item_failed(&item));

        item.as_task_mut().unwrap().status = TaskStatus::Failed;
        assert!(is_item_settled(&item));
        assert!(is_item_failed(&item));
    }
}
