//! Decision evaluation and execution.
//!
//! Decisions pass a fail-closed validation gate before they can be approved
//! or executed. Low-confidence, risky, or invalid decisions are routed to
//! human review through escalation.

use crate::error::{OrchestrationError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::clock::Clock;
use warden_core::events::{AuditEvent, EscalationNotifier, EventBus, Severity};
use warden_core::machine::transition;
use warden_core::models::{
    DecisionItem, DecisionSpec, DecisionStatus, ExecutionStep, RiskLevel, RollbackRecord,
    ValidationOutcome, WorkItem, WorkItemPayload,
};
use warden_core::storage::{StorageError, Store};

/// Confidence below which validation blocks execution outright.
const CONFIDENCE_BLOCK_FLOOR: u8 = 50;
/// Confidence below which a decision always needs human review.
const CONFIDENCE_REVIEW_FLOOR: u8 = 70;
/// Confidence below which high-risk decisions draw a warning.
const CONFIDENCE_WARN_FLOOR: u8 = 80;
/// Impact score above which supervisor approval is recommended.
const IMPACT_WARN_CEILING: u8 = 80;

/// Evaluates, approves, and executes decision work items.
pub struct DecisionEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    notifier: Arc<dyn EscalationNotifier>,
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine").finish_non_exhaustive()
    }
}

impl DecisionEngine {
    /// Creates a new engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        notifier: Arc<dyn EscalationNotifier>,
    ) -> Self {
        Self { store, clock, events, notifier }
    }

    /// Creates a decision from a spec and runs the validation gate over it.
    ///
    /// The decision is stored in `pending` with its validation outcome
    /// attached, whether or not validation passed.
    ///
    /// # Errors
    /// Returns `Validation` for out-of-range scores or an unknown system.
    pub async fn evaluate(&self, system_id: &str, spec: &DecisionSpec) -> Result<WorkItem> {
        if spec.confidence > 100 {
            return Err(OrchestrationError::Validation("confidence must be 0-100".to_string()));
        }
        if spec.impact_score > 100 {
            return Err(OrchestrationError::Validation("impact_score must be 0-100".to_string()));
        }
        match self.store.get_system(system_id).await {
            Ok(_) => {}
            Err(StorageError::NotFound(_)) => {
                return Err(OrchestrationError::SystemNotFound(system_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let now = self.clock.now();
        let mut decision = DecisionItem::from_spec(spec);
        decision.validation = Some(validate(&decision, now));

        let id = format!("decision-{}", Uuid::new_v4());
        let item = WorkItem::new(
            id.clone(),
            system_id.to_string(),
            spec.priority,
            WorkItemPayload::Decision(decision),
            now,
        );
        self.store.insert_work_item(item.clone()).await?;

        let valid = item
            .as_decision()
            .and_then(|d| d.validation.as_ref())
            .is_some_and(|v| v.valid);
        info!(
            item_id = %id,
            system_id = %system_id,
            confidence = spec.confidence,
            valid,
            "Decision evaluated"
        );
        Ok(item)
    }

    /// Approves a pending decision whose validation passed.
    ///
    /// # Errors
    /// Returns `Validation` when the gate did not pass, `InvalidTransition`
    /// when not pending.
    pub async fn approve(&self, item_id: &str) -> Result<WorkItem> {
        let item = self.get_decision_item(item_id).await?;
        let decision = decision_payload(&item)?;
        if !decision.validation.as_ref().is_some_and(|v| v.valid) {
            return Err(OrchestrationError::Validation(format!(
                "decision {item_id} failed validation and cannot be approved"
            )));
        }
        self.apply(item, DecisionStatus::Approved, |_, _| {}).await
    }

    /// Executes an approved decision, recording timestamped execution steps.
    ///
    /// # Errors
    /// Returns `Validation` when the gate did not pass, `InvalidTransition`
    /// when not approved.
    pub async fn execute(&self, item_id: &str) -> Result<WorkItem> {
        let item = self.get_decision_item(item_id).await?;
        let decision = decision_payload(&item)?;
        if !decision.validation.as_ref().is_some_and(|v| v.valid) {
            return Err(OrchestrationError::Validation(format!(
                "decision {item_id} failed validation and cannot be executed"
            )));
        }
        let action = decision.proposed_action.clone();
        self.apply(item, DecisionStatus::Executed, |decision, now| {
            decision.execution_log.push(ExecutionStep {
                description: "execution_started".to_string(),
                at: now,
            });
            decision.execution_log.push(ExecutionStep {
                description: format!("applied: {action}"),
                at: now,
            });
            decision.execution_log.push(ExecutionStep {
                description: "execution_completed".to_string(),
                at: now,
            });
        })
        .await
    }

    /// Rolls back an executed decision.
    ///
    /// # Errors
    /// Returns `InvalidTransition` unless the decision is executed.
    pub async fn rollback(&self, item_id: &str, reason: &str) -> Result<WorkItem> {
        let item = self.get_decision_item(item_id).await?;
        let reason = reason.to_string();
        warn!(item_id = %item_id, reason = %reason, "Decision rollback");
        self.apply(item, DecisionStatus::RolledBack, |decision, now| {
            decision.rollback = Some(RollbackRecord { reason, at: now });
        })
        .await
    }

    /// Escalates a decision to human review.
    ///
    /// # Errors
    /// Returns `InvalidTransition` from terminal or executed states.
    pub async fn escalate(&self, item_id: &str, reason: &str, level: u8) -> Result<WorkItem> {
        let item = self.get_decision_item(item_id).await?;
        let now = self.clock.now();
        let updated = self
            .apply(item, DecisionStatus::Escalated, |decision, _| {
                decision.escalation_required = true;
                decision.escalation_level = Some(level);
            })
            .await?;

        self.events.emit(
            AuditEvent::EscalationTriggered {
                subject_id: item_id.to_string(),
                reason: reason.to_string(),
            },
            Severity::Warning,
            now,
        );
        self.notifier.notify_escalation(item_id, reason, Severity::Warning).await;
        Ok(updated)
    }

    /// Marks an escalated or pending decision as approved after human
    /// review.
    ///
    /// # Errors
    /// Returns `InvalidTransition` from other states.
    pub async fn approve_after_review(&self, item_id: &str) -> Result<WorkItem> {
        let item = self.get_decision_item(item_id).await?;
        self.apply(item, DecisionStatus::Approved, |decision, _| {
            decision.human_reviewed = true;
            decision.escalation_required = false;
        })
        .await
    }

    async fn apply<F>(&self, mut item: WorkItem, to: DecisionStatus, mutate: F) -> Result<WorkItem>
    where
        F: FnOnce(&mut DecisionItem, DateTime<Utc>),
    {
        let now = self.clock.now();
        let from_label = item.status_label();
        let from = decision_payload(&item)?.status;
        let next = transition(&item.id, from, to)?;

        let decision = item
            .as_decision_mut()
            .ok_or_else(|| OrchestrationError::Validation("not a decision".to_string()))?;
        decision.status = next;
        mutate(decision, now);
        item.touch(now);

        let updated = self.store.update_work_item(item).await?;
        debug!(item_id = %updated.id, from = from_label, to = updated.status_label(), "Decision transition");
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

    async fn get_decision_item(&self, id: &str) -> Result<WorkItem> {
        match self.store.get_work_item(id).await {
            Ok(item) => Ok(item),
            Err(StorageError::NotFound(_)) => {
                Err(OrchestrationError::WorkItemNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn decision_payload(item: &WorkItem) -> Result<&DecisionItem> {
    item.as_decision()
        .ok_or_else(|| OrchestrationError::Validation(format!("{} is not a decision", item.id)))
}

/// Runs the fail-closed validation gate over a decision.
///
/// Blocking errors: empty proposed action, confidence below 50, any failed
/// required compliance check. Warnings: low confidence on high-risk actions,
/// and impact above 80 (supervisor approval recommended).
#[must_use]
pub fn validate(decision: &DecisionItem, now: DateTime<Utc>) -> ValidationOutcome {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if decision.proposed_action.trim().is_empty() {
        errors.push("proposed action is empty".to_string());
    }
    if decision.confidence < CONFIDENCE_BLOCK_FLOOR {
        errors.push(format!(
            "confidence {} below minimum {CONFIDENCE_BLOCK_FLOOR}",
            decision.confidence
        ));
    }
    for check in &decision.compliance_checks {
        if check.required && !check.passed {
            errors.push(format!("required compliance check failed: {}", check.name));
        }
    }

    if decision.confidence < CONFIDENCE_WARN_FLOOR && decision.risk_level == RiskLevel::High {
        warnings.push("low confidence for a high-risk action".to_string());
    }
    if decision.impact_score > IMPACT_WARN_CEILING {
        warnings.push("high impact; supervisor approval recommended".to_string());
    }

    ValidationOutcome { valid: errors.is_empty(), errors, warnings, checked_at: now }
}

/// Whether a decision must pass through human review before execution.
#[must_use]
pub fn should_require_human_review(decision: &DecisionItem) -> bool {
    decision.escalation_required
        || decision.confidence < CONFIDENCE_REVIEW_FLOOR
        || decision.risk_level == RiskLevel::Critical
        || !decision.validation.as_ref().is_some_and(|v| v.valid)
}
