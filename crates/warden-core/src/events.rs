//! Audit events and escalation notifications.
//!
//! Every state change of interest is emitted on a broadcast bus so observers
//! (logging, tests, future UIs) can follow the orchestrator without polling.
//! Escalations additionally go through an [`EscalationNotifier`] so a human
//! channel can be plugged in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Severity attached to an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Routine state change.
    Info,
    /// Degraded but operating.
    Warning,
    /// Requires attention.
    Critical,
}

/// One audit event emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A system was registered.
    SystemCreated {
        /// Id of the system.
        system_id: String,
    },
    /// A system changed status.
    SystemStatusChanged {
        /// Id of the system.
        system_id: String,
        /// Previous status label.
        from: String,
        /// New status label.
        to: String,
    },
    /// A system's capability flags were patched.
    CapabilitiesUpdated {
        /// Id of the system.
        system_id: String,
        /// Recomputed automation percentage.
        automation_percentage: u8,
    },
    /// A work item changed status.
    WorkItemTransition {
        /// Id of the work item.
        item_id: String,
        /// Previous status label.
        from: String,
        /// New status label.
        to: String,
    },
    /// A dependency edge changed status.
    DependencyStatusChanged {
        /// Id of the edge.
        edge_id: String,
        /// New status label.
        status: String,
    },
    /// A work item or system was escalated for human attention.
    EscalationTriggered {
        /// Id of the escalated entity.
        subject_id: String,
        /// Why the escalation fired.
        reason: String,
    },
}

/// A timestamped, severity-tagged audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// The event.
    pub event: AuditEvent,
    /// Severity of the event.
    pub severity: Severity,
    /// When the event was emitted.
    pub at: DateTime<Utc>,
}

/// Broadcast bus for audit records.
///
/// Lagging or absent subscribers never block emission; records sent with no
/// receivers are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuditRecord>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to all future records.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.sender.subscribe()
    }

    /// Emits a record to all current subscribers.
    pub fn emit(&self, event: AuditEvent, severity: Severity, now: DateTime<Utc>) {
        let record = AuditRecord { event, severity, at: now };
        match severity {
            Severity::Info => info!(event = ?record.event, "Audit event"),
            Severity::Warning | Severity::Critical => {
                warn!(event = ?record.event, severity = ?severity, "Audit event");
            }
        }
        // Err here only means nobody is listening.
        let _ = self.sender.send(record);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Sink for escalations that need a human.
///
/// Delivery is fire-and-forget: implementations must not let a failed
/// notification fail the operation that triggered it.
#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    /// Delivers an escalation notice.
    async fn notify_escalation(&self, subject_id: &str, reason: &str, severity: Severity);
}

/// Notifier that writes escalations to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl EscalationNotifier for LoggingNotifier {
    async fn notify_escalation(&self, subject_id: &str, reason: &str, severity: Severity) {
        warn!(
            subject_id = %subject_id,
            reason = %reason,
            severity = ?severity,
            "Escalation requires human attention"
        );
    }
}

/// One escalation captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationNotice {
    /// Id of the escalated entity.
    pub subject_id: String,
    /// Why the escalation fired.
    pub reason: String,
    /// Severity of the escalation.
    pub severity: Severity,
}

/// Notifier that records escalations for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<EscalationNotice>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded notices.
    ///
    /// # Panics
    /// Panics if the inner lock is poisoned.
    #[must_use]
    pub fn notices(&self) -> Vec<EscalationNotice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl EscalationNotifier for RecordingNotifier {
    async fn notify_escalation(&self, subject_id: &str, reason: &str, severity: Severity) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(EscalationNotice {
                subject_id: subject_id.to_string(),
                reason: reason.to_string(),
                severity,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(
            AuditEvent::SystemCreated { system_id: "sys-1".to_string() },
            Severity::Info,
            DateTime::<Utc>::UNIX_EPOCH,
        );

        let record = rx.recv().await.unwrap();
        assert_eq!(record.severity, Severity::Info);
        assert_eq!(record.event, AuditEvent::SystemCreated { system_id: "sys-1".to_string() });
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(8);
        bus.emit(
            AuditEvent::EscalationTriggered {
                subject_id: "task-1".to_string(),
                reason: "retries exhausted".to_string(),
            },
            Severity::Critical,
            DateTime::<Utc>::UNIX_EPOCH,
        );
    }

    #[tokio::test]
    async fn test_recording_notifier_captures_notices() {
        let notifier = RecordingNotifier::new();
        notifier
            .notify_escalation("sys-1", "health below threshold", Severity::Critical)
            .await;

        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].subject_id, "sys-1");
        assert_eq!(notices[0].severity, Severity::Critical);
    }

    #[test]
    fn test_event_serde_uses_snake_case_tags() {
        let event = AuditEvent::WorkItemTransition {
            item_id: "task-1".to_string(),
            from: "queued".to_string(),
            to: "running".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("work_item_transition"));
    }
}
