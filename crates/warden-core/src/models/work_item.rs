//! Work item data structures.
//!
//! A [`WorkItem`] is a unit of work owned by one autonomous system. The three
//! kinds (task, decision, optimization) share an envelope — id, owning
//! system, priority, optimistic-concurrency version — and carry kind-specific
//! payloads as a tagged union, so transition logic lives in one state-machine
//! helper instead of three parallel record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::dependency::DependencySpec;

/// Priority of a work item (higher = more important).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum Priority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Elevated priority.
    High,
    /// Failure exhaustion raises an escalation.
    Critical,
    /// Highest priority; always escalates on exhaustion.
    Emergency,
}

impl Priority {
    /// Whether retry exhaustion at this priority must flag escalation.
    #[must_use]
    pub fn escalates_on_exhaustion(&self) -> bool {
        *self >= Self::Critical
    }
}

/// Risk classification for decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum RiskLevel {
    /// Negligible impact if wrong.
    Low,
    /// Bounded impact.
    #[default]
    Medium,
    /// Significant impact; warrants extra validation.
    High,
    /// Requires human review before execution.
    Critical,
}

/// Runtime status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum TaskStatus {
    /// Created, not yet eligible to run.
    #[default]
    Pending,
    /// Eligible and waiting for the dispatcher.
    Queued,
    /// Currently executing.
    Running,
    /// Execution paused.
    Paused,
    /// Finished successfully.
    Completed,
    /// Failed with no retries remaining.
    Failed,
    /// Cancelled before execution.
    Cancelled,
    /// Failed with retries remaining; parked until the backoff elapses.
    Retrying,
    /// Deadline exceeded while running; treated as a failure for retries.
    Timeout,
}

/// Status of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum DecisionStatus {
    /// Awaiting validation/approval.
    #[default]
    Pending,
    /// Validation passed; cleared for execution.
    Approved,
    /// Executed.
    Executed,
    /// Validation or execution failed.
    Failed,
    /// Rolled back after execution.
    RolledBack,
    /// Removed from autonomous handling pending human review.
    Escalated,
}

/// Status of an optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum OptimizationStatus {
    /// Gathering data about the target.
    #[default]
    Analyzing,
    /// Producing an implementation plan.
    Planning,
    /// Applying the optimization.
    Implementing,
    /// Verifying the applied optimization.
    Testing,
    /// Finished successfully.
    Completed,
    /// Abandoned.
    Aborted,
}

/// Result of a task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// The output produced by the task (JSON value).
    pub output: Value,
    /// Optional error message if the task failed.
    pub error: Option<String>,
    /// Timestamp when the task started execution.
    pub started_at: DateTime<Utc>,
    /// Timestamp when the task completed execution.
    pub completed_at: Option<DateTime<Utc>>,
    /// Duration of execution in milliseconds.
    pub duration_ms: Option<u64>,
}

impl TaskResult {
    /// Creates a result representing a successful completion.
    #[must_use]
    pub fn success(output: Value, started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        let duration_ms =
            completed_at.signed_duration_since(started_at).num_milliseconds().max(0) as u64;
        Self { output, error: None, started_at, completed_at: Some(completed_at), duration_ms: Some(duration_ms) }
    }

    /// Creates a result representing a failed execution.
    #[must_use]
    pub fn failure(error: String, started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        let duration_ms =
            completed_at.signed_duration_since(started_at).num_milliseconds().max(0) as u64;
        Self {
            output: Value::Null,
            error: Some(error),
            started_at,
            completed_at: Some(completed_at),
            duration_ms: Some(duration_ms),
        }
    }

    /// Returns whether the result represents a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Task payload: a discrete unit of executable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Human-readable name.
    pub name: String,
    /// Current runtime status.
    pub status: TaskStatus,
    /// Number of retries attempted so far (monotonic).
    pub retry_count: u32,
    /// Maximum number of retries before terminal failure.
    pub max_retries: u32,
    /// Completion progress, 0-100.
    pub progress: u8,
    /// Hard deadline; a running task past this transitions to `timeout`.
    pub deadline: Option<DateTime<Utc>>,
    /// Earliest start time for scheduled tasks.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Next retry instant while in `retrying`.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// When the current/last run started.
    pub started_at: Option<DateTime<Utc>>,
    /// Result of the task execution, if finished.
    pub result: Option<TaskResult>,
    /// Set when retry exhaustion at critical/emergency priority demands review.
    pub escalation_required: bool,
    /// Set when a caller cancelled the task while it was running; the next
    /// deadline sweep lands it in `cancelled` instead of the retry path.
    #[serde(default)]
    pub cancellation_requested: bool,
    /// Id of the decision that triggered this task, if any.
    pub triggered_by: Option<String>,
}

impl TaskItem {
    /// Creates a pending task with no retries attempted.
    #[must_use]
    pub fn new(name: String, max_retries: u32) -> Self {
        Self {
            name,
            status: TaskStatus::default(),
            retry_count: 0,
            max_retries,
            progress: 0,
            deadline: None,
            scheduled_at: None,
            next_retry_at: None,
            started_at: None,
            result: None,
            escalation_required: false,
            cancellation_requested: false,
            triggered_by: None,
        }
    }

    /// Creates a task from a submission spec.
    ///
    /// `default_max_retries` applies when the spec leaves `max_retries` unset.
    #[must_use]
    pub fn from_spec(spec: &TaskSpec, default_max_retries: u32) -> Self {
        let mut task = Self::new(spec.name.clone(), spec.max_retries.unwrap_or(default_max_retries));
        task.deadline = spec.deadline;
        task.scheduled_at = spec.scheduled_at;
        task.triggered_by = spec.triggered_by.clone();
        task
    }
}

/// A compliance check attached to a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    /// Name of the check.
    pub name: String,
    /// Whether a failure blocks execution.
    pub required: bool,
    /// Whether the check passed.
    pub passed: bool,
}

/// Outcome of validating a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the decision may proceed to approval/execution.
    pub valid: bool,
    /// Blocking reasons (empty when valid).
    pub errors: Vec<String>,
    /// Non-blocking warnings.
    pub warnings: Vec<String>,
    /// When validation ran.
    pub checked_at: DateTime<Utc>,
}

/// One step recorded while executing a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// What happened.
    pub description: String,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// Record of a decision rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    /// Why the decision was rolled back.
    pub reason: String,
    /// When the rollback happened.
    pub at: DateTime<Utc>,
}

/// Decision payload: a judgment rendered under uncertainty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionItem {
    /// The action this decision proposes.
    pub proposed_action: String,
    /// Current status.
    pub status: DecisionStatus,
    /// Confidence in the proposed action, 0-100.
    pub confidence: u8,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Expected impact score, 0-100.
    pub impact_score: u8,
    /// Compliance checks evaluated for this decision.
    pub compliance_checks: Vec<ComplianceCheck>,
    /// Most recent validation outcome, if validation has run.
    pub validation: Option<ValidationOutcome>,
    /// Whether this decision has been flagged for escalation.
    pub escalation_required: bool,
    /// Escalation level, when escalated.
    pub escalation_level: Option<u8>,
    /// Whether a human has reviewed this decision.
    pub human_reviewed: bool,
    /// Ordered execution steps with timestamps.
    pub execution_log: Vec<ExecutionStep>,
    /// Rollback record, if rolled back.
    pub rollback: Option<RollbackRecord>,
}

impl DecisionItem {
    /// Creates a pending decision from a submission spec.
    #[must_use]
    pub fn from_spec(spec: &DecisionSpec) -> Self {
        Self {
            proposed_action: spec.proposed_action.clone(),
            status: DecisionStatus::default(),
            confidence: spec.confidence,
            risk_level: spec.risk_level,
            impact_score: spec.impact_score,
            compliance_checks: spec.compliance_checks.clone(),
            validation: None,
            escalation_required: false,
            escalation_level: None,
            human_reviewed: false,
            execution_log: Vec::new(),
            rollback: None,
        }
    }
}

/// Validation state for an optimization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OptimizationValidation {
    /// Whether the pre-implementation simulation passed. Gates `implementing`.
    pub simulation_passed: Option<bool>,
    /// When the simulation ran.
    pub simulated_at: Option<DateTime<Utc>>,
}

/// Optimization payload: an analyze/plan/implement/test lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationItem {
    /// What is being optimized (free-form type tag).
    pub optimization_type: String,
    /// Current status.
    pub status: OptimizationStatus,
    /// Simulation gate state.
    pub validation: OptimizationValidation,
    /// Id of the decision that triggered this optimization, if any.
    pub triggered_by: Option<String>,
    /// Reason recorded when aborted.
    pub abort_reason: Option<String>,
}

impl OptimizationItem {
    /// Creates an optimization in the analyzing phase.
    #[must_use]
    pub fn new(optimization_type: String) -> Self {
        Self {
            optimization_type,
            status: OptimizationStatus::default(),
            validation: OptimizationValidation::default(),
            triggered_by: None,
            abort_reason: None,
        }
    }
}

/// Kind discriminant for work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemKind {
    /// Executable task.
    Task,
    /// Decision under uncertainty.
    Decision,
    /// Optimization lifecycle.
    Optimization,
}

impl std::fmt::Display for WorkItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task => f.write_str("task"),
            Self::Decision => f.write_str("decision"),
            Self::Optimization => f.write_str("optimization"),
        }
    }
}

/// Kind-specific payload of a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkItemPayload {
    /// Task payload.
    Task(TaskItem),
    /// Decision payload.
    Decision(DecisionItem),
    /// Optimization payload.
    Optimization(OptimizationItem),
}

/// A unit of work owned by one autonomous system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier.
    pub id: String,
    /// Owning system id.
    pub system_id: String,
    /// Scheduling priority.
    pub priority: Priority,
    /// Optimistic-concurrency version; bumped by the store on every update.
    pub version: u64,
    /// Kind-specific payload.
    pub payload: WorkItemPayload,
    /// Timestamp when the item was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp when the item was last updated.
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Creates a new work item wrapping the given payload.
    #[must_use]
    pub fn new(
        id: String,
        system_id: String,
        priority: Priority,
        payload: WorkItemPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self { id, system_id, priority, version: 0, payload, created_at: now, updated_at: now }
    }

    /// Returns the kind discriminant of this item.
    #[must_use]
    pub fn kind(&self) -> WorkItemKind {
        match self.payload {
            WorkItemPayload::Task(_) => WorkItemKind::Task,
            WorkItemPayload::Decision(_) => WorkItemKind::Decision,
            WorkItemPayload::Optimization(_) => WorkItemKind::Optimization,
        }
    }

    /// Returns the task payload, if this is a task.
    #[must_use]
    pub fn as_task(&self) -> Option<&TaskItem> {
        match &self.payload {
            WorkItemPayload::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Returns the task payload mutably, if this is a task.
    pub fn as_task_mut(&mut self) -> Option<&mut TaskItem> {
        match &mut self.payload {
            WorkItemPayload::Task(task) => Some(task),
            _ => None,
        }
    }

    /// Returns the decision payload, if this is a decision.
    #[must_use]
    pub fn as_decision(&self) -> Option<&DecisionItem> {
        match &self.payload {
            WorkItemPayload::Decision(decision) => Some(decision),
            _ => None,
        }
    }

    /// Returns the decision payload mutably, if this is a decision.
    pub fn as_decision_mut(&mut self) -> Option<&mut DecisionItem> {
        match &mut self.payload {
            WorkItemPayload::Decision(decision) => Some(decision),
            _ => None,
        }
    }

    /// Returns the optimization payload, if this is an optimization.
    #[must_use]
    pub fn as_optimization(&self) -> Option<&OptimizationItem> {
        match &self.payload {
            WorkItemPayload::Optimization(opt) => Some(opt),
            _ => None,
        }
    }

    /// Returns the optimization payload mutably, if this is an optimization.
    pub fn as_optimization_mut(&mut self) -> Option<&mut OptimizationItem> {
        match &mut self.payload {
            WorkItemPayload::Optimization(opt) => Some(opt),
            _ => None,
        }
    }

    /// Returns the snake_case label of the current status, for logs/events.
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        match &self.payload {
            WorkItemPayload::Task(t) => match t.status {
                TaskStatus::Pending => "pending",
                TaskStatus::Queued => "queued",
                TaskStatus::Running => "running",
                TaskStatus::Paused => "paused",
                TaskStatus::Completed => "completed",
                TaskStatus::Failed => "failed",
                TaskStatus::Cancelled => "cancelled",
                TaskStatus::Retrying => "retrying",
                TaskStatus::Timeout => "timeout",
            },
            WorkItemPayload::Decision(d) => match d.status {
                DecisionStatus::Pending => "pending",
                DecisionStatus::Approved => "approved",
                DecisionStatus::Executed => "executed",
                DecisionStatus::Failed => "failed",
                DecisionStatus::RolledBack => "rolled_back",
                DecisionStatus::Escalated => "escalated",
            },
            WorkItemPayload::Optimization(o) => match o.status {
                OptimizationStatus::Analyzing => "analyzing",
                OptimizationStatus::Planning => "planning",
                OptimizationStatus::Implementing => "implementing",
                OptimizationStatus::Testing => "testing",
                OptimizationStatus::Completed => "completed",
                OptimizationStatus::Aborted => "aborted",
            },
        }
    }

    /// Bumps the updated-at timestamp.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Submission spec for a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Human-readable name.
    pub name: String,
    /// Scheduling priority.
    #[serde(default)]
    pub priority: Priority,
    /// Maximum retries; falls back to the configured default when `None`.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Hard deadline.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Earliest start time for scheduled tasks.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Dependency edges to create alongside the task.
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    /// Id of the decision that triggered this task, if any.
    #[serde(default)]
    pub triggered_by: Option<String>,
}

/// Submission spec for a decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionSpec {
    /// The action this decision proposes.
    pub proposed_action: String,
    /// Confidence in the proposed action, 0-100.
    pub confidence: u8,
    /// Risk classification.
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Expected impact score, 0-100.
    #[serde(default)]
    pub impact_score: u8,
    /// Compliance checks to evaluate.
    #[serde(default)]
    pub compliance_checks: Vec<ComplianceCheck>,
    /// Scheduling priority.
    #[serde(default)]
    pub priority: Priority,
}

/// Submission spec carried by an external trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkItemSpec {
    /// Submit a task.
    Task(TaskSpec),
    /// Submit a decision.
    Decision(DecisionSpec),
    /// Schedule an optimization of the given type.
    Optimization {
        /// What to optimize.
        optimization_type: String,
    },
}
