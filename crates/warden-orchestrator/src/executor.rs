//! Task execution driver.
//!
//! Moves tasks through their state machine: submission, dependency-gated
//! start, completion, failure with deterministic exponential backoff, retry
//! exhaustion with escalation, cooperative cancellation, and deadline
//! timeouts. All writes go through the store's per-item version check, so
//! two concurrent callers can never both advance the same task.

use crate::error::{OrchestrationError, Result};
use crate::resolver::ensure_acyclic;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::clock::Clock;
use warden_core::config::RetryConfig;
use warden_core::events::{AuditEvent, EscalationNotifier, EventBus, Severity};
use warden_core::machine::transition;
use warden_core::models::{
    DependencyEdge, TaskItem, TaskResult, TaskSpec, TaskStatus, WorkItem, WorkItemPayload,
};
use warden_core::storage::{StorageError, Store};

/// Drives task work items through their lifecycle.
pub struct TaskExecutor {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    notifier: Arc<dyn EscalationNotifier>,
    config: RetryConfig,
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor").field("config", &self.config).finish_non_exhaustive()
    }
}

impl TaskExecutor {
    /// Creates a new executor.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        notifier: Arc<dyn EscalationNotifier>,
        config: RetryConfig,
    ) -> Self {
        Self { store, clock, events, notifier, config }
    }

    /// Submits a task for a system, creating its dependency edges.
    ///
    /// Each edge is checked against the existing graph before insertion;
    /// a cycle rejects the whole submission.
    ///
    /// # Errors
    /// Returns `Validation` for an empty name, `SystemNotFound` for an
    /// unknown owner, `WorkItemNotFound` for an unknown dependency target,
    /// or `CycleDetected`.
    pub async fn submit_task(&self, system_id: &str, spec: &TaskSpec) -> Result<WorkItem> {
        if spec.name.trim().is_empty() {
            return Err(OrchestrationError::Validation("task name cannot be empty".to_string()));
        }
        match self.store.get_system(system_id).await {
            Ok(_) => {}
            Err(StorageError::NotFound(_)) => {
                return Err(OrchestrationError::SystemNotFound(system_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let now = self.clock.now();
        let id = format!("task-{}", Uuid::new_v4());
        let item = WorkItem::new(
            id.clone(),
            system_id.to_string(),
            spec.priority,
            WorkItemPayload::Task(TaskItem::from_spec(spec, self.config.default_max_retries)),
            now,
        );

        // Validate the whole edge set before writing anything.
        let existing = self.store.list_edges().await?;
        let mut new_edges = Vec::with_capacity(spec.dependencies.len());
        for dep in &spec.dependencies {
            match self.store.get_work_item(&dep.depends_on_id).await {
                Ok(_) => {}
                Err(StorageError::NotFound(_)) => {
                    return Err(OrchestrationError::WorkItemNotFound(dep.depends_on_id.clone()));
                }
                Err(e) => return Err(e.into()),
            }
            ensure_acyclic(&existing, &id, &dep.depends_on_id)?;
            let edge =
                DependencyEdge::from_spec(format!("edge-{}", Uuid::new_v4()), id.clone(), dep, now);
            new_edges.push(edge);
        }

        self.store.insert_work_item(item.clone()).await?;
        for edge in new_edges {
            self.store.insert_edge(edge).await?;
        }

        info!(
            item_id = %id,
            system_id = %system_id,
            name = %spec.name,
            dependencies = spec.dependencies.len(),
            "Task submitted"
        );
        Ok(item)
    }

    /// Whether a task may start now.
    ///
    /// True only if the task is pending or queued, every edge gating it is
    /// satisfied or skipped, and any scheduled start time has arrived.
    ///
    /// # Errors
    /// Returns `WorkItemNotFound` or `Validation` for non-task items.
    pub async fn can_start(&self, item_id: &str) -> Result<bool> {
        let item = self.get_task_item(item_id).await?;
        let task = task_payload(&item)?;

        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Queued) {
            return Ok(false);
        }
        if let Some(scheduled_at) = task.scheduled_at {
            if self.clock.now() < scheduled_at {
                return Ok(false);
            }
        }
        let edges = self.store.edges_for_source(item_id).await?;
        Ok(edges.iter().all(|e| !e.is_blocking()))
    }

    /// Promotes a pending task to queued if it may start.
    ///
    /// Returns the updated item when promoted, `None` when the task is not
    /// startable yet.
    ///
    /// # Errors
    /// Returns `WorkItemNotFound`, `Validation`, or `ConcurrencyConflict`.
    pub async fn try_queue(&self, item_id: &str) -> Result<Option<WorkItem>> {
        let item = self.get_task_item(item_id).await?;
        if task_payload(&item)?.status != TaskStatus::Pending || !self.can_start(item_id).await? {
            return Ok(None);
        }
        Ok(Some(self.apply(item, TaskStatus::Queued, |_, _| {}).await?))
    }

    /// Starts a queued task.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the task is queued and startable,
    /// `Validation` if its gating edges are unsatisfied.
    pub async fn start(&self, item_id: &str) -> Result<WorkItem> {
        if !self.can_start(item_id).await? {
            return Err(OrchestrationError::Validation(format!(
                "task {item_id} has unsatisfied dependencies or has not reached its scheduled time"
            )));
        }
        let item = self.get_task_item(item_id).await?;
        let now = self.clock.now();
        self.apply(item, TaskStatus::Running, |task, _| {
            task.started_at = Some(now);
        })
        .await
    }

    /// Completes a running task with its output.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the task is running.
    pub async fn complete(&self, item_id: &str, output: Value) -> Result<WorkItem> {
        let item = self.get_task_item(item_id).await?;
        let now = self.clock.now();
        self.apply(item, TaskStatus::Completed, |task, _| {
            let started = task.started_at.unwrap_or(now);
            task.result = Some(TaskResult::success(output, started, now));
            task.progress = 100;
        })
        .await
    }

    /// Records a failure of a running task and applies retry accounting.
    ///
    /// While retries remain the task moves to `retrying` with
    /// `next_retry_at = now + base * 2^(retry_count - 1)`. On exhaustion it
    /// fails terminally; critical and emergency priority tasks are flagged
    /// for escalation.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the task is running.
    pub async fn fail(&self, item_id: &str, error: String) -> Result<WorkItem> {
        let item = self.get_task_item(item_id).await?;
        self.apply_failure(item, Some(error)).await
    }

    /// Cancels a task.
    ///
    /// Legal while pending, queued, or paused. A running task cannot stop
    /// instantaneously; cancellation flags the task and collapses its
    /// deadline so the next timeout sweep delivers the cancellation instead
    /// of retry accounting.
    ///
    /// # Errors
    /// Returns `InvalidTransition` for terminal tasks.
    pub async fn cancel(&self, item_id: &str) -> Result<WorkItem> {
        let mut item = self.get_task_item(item_id).await?;
        let now = self.clock.now();
        let status = task_payload(&item)?.status;

        if status == TaskStatus::Running {
            let task = item.as_task_mut().ok_or_else(|| {
                OrchestrationError::Validation(format!("{item_id} is not a task"))
            })?;
            task.cancellation_requested = true;
            task.deadline = Some(now);
            item.touch(now);
            let updated = self.store.update_work_item(item).await?;
            info!(item_id = %item_id, "Cancellation requested for running task");
            return Ok(updated);
        }

        self.apply(item, TaskStatus::Cancelled, |_, _| {}).await
    }

    /// Times out running tasks whose deadline has passed, then applies
    /// retry accounting to each. Tasks with a pending cancellation request
    /// land in `cancelled` instead of the retry path. Returns the affected
    /// item ids.
    ///
    /// # Errors
    /// Returns the first storage failure.
    pub async fn check_timeouts(&self) -> Result<Vec<String>> {
        let now = self.clock.now();
        let mut timed_out = Vec::new();
        for item in self.store.list_work_items().await? {
            let Some(task) = item.as_task() else { continue };
            if task.status != TaskStatus::Running {
                continue;
            }
            let Some(deadline) = task.deadline else { continue };
            if deadline > now {
                continue;
            }
            let cancel_requested = task.cancellation_requested;
            let id = item.id.clone();
            if cancel_requested {
                info!(item_id = %id, "Cancellation delivered");
                self.apply(item, TaskStatus::Cancelled, |_, _| {}).await?;
                timed_out.push(id);
                continue;
            }
            warn!(item_id = %id, "Task exceeded deadline");
            let updated = self.apply(item, TaskStatus::Timeout, |_, _| {}).await?;
            // Timeout counts as a failure for retry purposes.
            self.apply_failure(updated, Some("deadline exceeded".to_string())).await?;
            timed_out.push(id);
        }
        Ok(timed_out)
    }

    /// Re-queues retrying tasks whose backoff has elapsed. Returns the
    /// released item ids.
    ///
    /// # Errors
    /// Returns the first storage failure.
    pub async fn release_retries(&self) -> Result<Vec<String>> {
        let now = self.clock.now();
        let mut released = Vec::new();
        for item in self.store.list_work_items().await? {
            let Some(task) = item.as_task() else { continue };
            if task.status != TaskStatus::Retrying {
                continue;
            }
            if task.next_retry_at.is_some_and(|at| at <= now) {
                let id = item.id.clone();
                self.apply(item, TaskStatus::Queued, |task, _| {
                    task.next_retry_at = None;
                })
                .await?;
                debug!(item_id = %id, "Retry released");
                released.push(id);
            }
        }
        Ok(released)
    }

    /// Applies failure accounting from the task's current failure-capable
    /// status (running or timeout).
    async fn apply_failure(&self, item: WorkItem, error: Option<String>) -> Result<WorkItem> {
        let now = self.clock.now();
        let task = task_payload(&item)?;
        let attempts = task.retry_count + 1;
        let exhausted = attempts >= task.max_retries;
        let priority = item.priority;
        let item_id = item.id.clone();

        let target = if exhausted { TaskStatus::Failed } else { TaskStatus::Retrying };
        let backoff = self.backoff(attempts);
        let escalates = exhausted && priority.escalates_on_exhaustion();

        let updated = self
            .apply(item, target, |task, now| {
                task.retry_count = attempts;
                if let Some(message) = error {
                    let started = task.started_at.unwrap_or(now);
                    task.result = Some(TaskResult::failure(message, started, now));
                }
                if exhausted {
                    task.next_retry_at = None;
                    task.escalation_required = escalates;
                } else {
                    task.next_retry_at = Some(now + backoff);
                }
            })
            .await?;

        if exhausted {
            warn!(item_id = %item_id, attempts, "Retries exhausted, task failed");
            if escalates {
                self.events.emit(
                    AuditEvent::EscalationTriggered {
                        subject_id: item_id.clone(),
                        reason: "retry_exhausted".to_string(),
                    },
                    Severity::Critical,
                    now,
                );
                self.notifier
                    .notify_escalation(&item_id, "retry_exhausted", Severity::Critical)
                    .await;
            }
        } else {
            debug!(item_id = %item_id, attempts, backoff_secs = backoff.num_seconds(), "Retry scheduled");
        }
        Ok(updated)
    }

    /// Deterministic exponential backoff for the nth retry (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let secs = self.config.base_delay_secs.saturating_mul(1 << exponent);
        Duration::seconds(secs as i64)
    }

    /// Validates and applies one state transition, mutating the payload
    /// under the new status, then writes through the version check and
    /// emits the transition event.
    async fn apply<F>(&self, mut item: WorkItem, to: TaskStatus, mutate: F) -> Result<WorkItem>
    where
        F: FnOnce(&mut TaskItem, DateTime<Utc>),
    {
        let now = self.clock.now();
        let from_label = item.status_label();
        let from = task_payload(&item)?.status;
        let next = transition(&item.id, from, to)?;

        let task = item
            .as_task_mut()
            .ok_or_else(|| OrchestrationError::Validation("not a task".to_string()))?;
        task.status = next;
        mutate(task, now);
        item.touch(now);

        let updated = self.store.update_work_item(item).await?;
        self.events.emit(
            AuditEvent::WorkItemTransition {
                item_id: updated.id.clone(),
                from: from_label.to_string(),
                to: updated.status_label().to_string(),
            },
            Severity::Info,
            now,
        );
        Ok(updated)
    }

    async fn get_task_item(&self, id: &str) -> Result<WorkItem> {
        match self.store.get_work_item(id).await {
            Ok(item) => Ok(item),
            Err(StorageError::NotFound(_)) => {
                Err(OrchestrationError::WorkItemNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn task_payload(item: &WorkItem) -> Result<&TaskItem> {
    item.as_task()
        .ok_or_else(|| OrchestrationError::Validation(format!("{} is not a task", item.id)))
}
