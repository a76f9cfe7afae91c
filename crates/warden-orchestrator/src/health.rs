//! Health monitoring for autonomous systems.
//!
//! Samples a system's recent tasks and decisions, computes a weighted health
//! score, and escalates the system into maintenance when the score drops
//! below the configured threshold. Periodic checks run on a per-system
//! background loop cancelled when the system is deleted.

use crate::error::Result;
use crate::registry::SystemRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time;
use tracing::{debug, info, warn};
use warden_core::clock::Clock;
use warden_core::config::HealthConfig;
use warden_core::events::{AuditEvent, EscalationNotifier, EventBus, Severity};
use warden_core::models::{DecisionStatus, PerformanceMetrics, SystemStatus, TaskStatus, WorkItem};
use warden_core::storage::Store;

/// Score component weights. Must sum to 1.
const WEIGHT_TASK_SUCCESS: f64 = 0.30;
const WEIGHT_DECISION_ACCURACY: f64 = 0.25;
const WEIGHT_RESPONSE_TIME: f64 = 0.20;
const WEIGHT_ERROR_RATE: f64 = 0.15;
const WEIGHT_UPTIME: f64 = 0.10;

/// Confidence at or above which a decision counts as accurate.
const ACCURACY_CONFIDENCE_FLOOR: u8 = 80;

/// Raw inputs to a health score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    /// Completed tasks / total tasks sampled (0 when no tasks).
    pub task_success_rate: f64,
    /// High-confidence decisions / total decisions sampled (0 when none).
    pub decision_accuracy: f64,
    /// Mean duration in milliseconds over completed tasks.
    pub avg_response_time_ms: f64,
    /// Failed tasks / total tasks sampled.
    pub error_rate: f64,
    /// Externally reported uptime percentage.
    pub uptime: f64,
    /// Number of tasks sampled.
    pub tasks_sampled: usize,
    /// Number of decisions sampled.
    pub decisions_sampled: usize,
}

/// Outcome of one health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Id of the checked system.
    pub system_id: String,
    /// Weighted score in [0, 100].
    pub health_score: u8,
    /// Raw inputs behind the score.
    pub metrics: HealthMetrics,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
}

/// Computes and records health scores for systems.
pub struct HealthMonitor {
    store: Arc<dyn Store>,
    registry: Arc<SystemRegistry>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    notifier: Arc<dyn EscalationNotifier>,
    config: HealthConfig,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor").field("config", &self.config).finish_non_exhaustive()
    }
}

impl HealthMonitor {
    /// Creates a new monitor.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<SystemRegistry>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        notifier: Arc<dyn EscalationNotifier>,
        config: HealthConfig,
    ) -> Self {
        Self { store, registry, clock, events, notifier, config }
    }

    /// Runs a health check for one system and persists the new score.
    ///
    /// The check is idempotent: with no intervening work-item activity,
    /// repeated calls produce the same score.
    ///
    /// # Errors
    /// Returns `OrchestrationError::SystemNotFound` if the system does not
    /// exist.
    pub async fn perform_health_check(&self, system_id: &str) -> Result<HealthReport> {
        let system = self.registry.get_system(system_id).await?;
        let items = self.store.list_work_items_for_system(system_id).await?;
        let metrics = self.sample_metrics(&items, system.monitoring.uptime);
        let health_score = score(&metrics);
        let checked_at = self.clock.now();

        debug!(
            system_id = %system_id,
            score = health_score,
            tasks = metrics.tasks_sampled,
            decisions = metrics.decisions_sampled,
            "Health check"
        );

        self.registry
            .record_health(system_id, health_score, aggregates(&items, &metrics))
            .await?;

        // A system with no sampled activity scores low by construction;
        // escalation only makes sense once it has actually done work.
        let has_activity = metrics.tasks_sampled > 0 || metrics.decisions_sampled > 0;
        if health_score < self.config.escalation_threshold
            && system.status == SystemStatus::Active
            && has_activity
        {
            self.escalate(system_id, health_score, checked_at).await?;
        }

        Ok(HealthReport { system_id: system_id.to_string(), health_score, metrics, checked_at })
    }

    /// Gathers score inputs from the most recent work items, bounded by the
    /// configured lookback per kind.
    fn sample_metrics(&self, items: &[WorkItem], uptime: f64) -> HealthMetrics {
        // Items arrive ordered by creation time; sample the newest.
        let tasks: Vec<_> = items
            .iter()
            .filter_map(|i| i.as_task())
            .rev()
            .take(self.config.lookback)
            .collect();
        let decisions: Vec<_> = items
            .iter()
            .filter_map(|i| i.as_decision())
            .rev()
            .take(self.config.lookback)
            .collect();

        let total_tasks = tasks.len();
        let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
        let failed = tasks.iter().filter(|t| t.status == TaskStatus::Failed).count();

        let durations: Vec<u64> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter_map(|t| t.result.as_ref().and_then(|r| r.duration_ms))
            .collect();
        let avg_response_time_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<u64>() as f64 / durations.len() as f64
        };

        let total_decisions = decisions.len();
        let accurate = decisions
            .iter()
            .filter(|d| {
                d.confidence >= ACCURACY_CONFIDENCE_FLOOR
                    && d.status != DecisionStatus::RolledBack
            })
            .count();

        HealthMetrics {
            task_success_rate: ratio(completed, total_tasks),
            decision_accuracy: ratio(accurate, total_decisions),
            avg_response_time_ms,
            error_rate: ratio(failed, total_tasks),
            uptime,
            tasks_sampled: total_tasks,
            decisions_sampled: total_decisions,
        }
    }

    /// Moves a system into maintenance and notifies the escalation channel.
    async fn escalate(&self, system_id: &str, score: u8, now: DateTime<Utc>) -> Result<()> {
        warn!(
            system_id = %system_id,
            score,
            threshold = self.config.escalation_threshold,
            "Health below threshold, escalating to maintenance"
        );
        self.registry
            .transition_status(system_id, SystemStatus::Maintenance)
            .await?;
        self.events.emit(
            AuditEvent::EscalationTriggered {
                subject_id: system_id.to_string(),
                reason: "health_threshold_exceeded".to_string(),
            },
            Severity::Critical,
            now,
        );
        // Fire-and-forget; the notifier never fails the check.
        self.notifier
            .notify_escalation(system_id, "health_threshold_exceeded", Severity::Critical)
            .await;
        Ok(())
    }
}

/// Applies the weighted formula, clamps to [0, 100], and rounds.
fn score(metrics: &HealthMetrics) -> u8 {
    let response_term = (100.0 - metrics.avg_response_time_ms / 10_000.0 * 100.0).max(0.0);
    let raw = 100.0 * metrics.task_success_rate * WEIGHT_TASK_SUCCESS
        + 100.0 * metrics.decision_accuracy * WEIGHT_DECISION_ACCURACY
        + response_term * WEIGHT_RESPONSE_TIME
        + (1.0 - metrics.error_rate) * 100.0 * WEIGHT_ERROR_RATE
        + metrics.uptime * WEIGHT_UPTIME;
    raw.clamp(0.0, 100.0).round() as u8
}

/// Builds the rolling aggregates stored on the system record.
fn aggregates(items: &[WorkItem], metrics: &HealthMetrics) -> PerformanceMetrics {
    let tasks_completed = items
        .iter()
        .filter_map(WorkItem::as_task)
        .filter(|t| t.status == TaskStatus::Completed)
        .count() as u64;
    let tasks_failed = items
        .iter()
        .filter_map(WorkItem::as_task)
        .filter(|t| t.status == TaskStatus::Failed)
        .count() as u64;
    let decisions_executed = items
        .iter()
        .filter_map(WorkItem::as_decision)
        .filter(|d| d.status == DecisionStatus::Executed)
        .count() as u64;
    PerformanceMetrics {
        tasks_completed,
        tasks_failed,
        decisions_executed,
        avg_response_time_ms: metrics.avg_response_time_ms,
        last_health_check: None,
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Owns the per-system periodic health-check loops.
///
/// Each scheduled system gets a background task ticking at its configured
/// interval; dropping the handle via [`MonitorScheduler::cancel`] stops the
/// loop through a watch channel.
pub struct MonitorScheduler {
    monitor: Arc<HealthMonitor>,
    handles: Mutex<HashMap<String, watch::Sender<()>>>,
}

impl std::fmt::Debug for MonitorScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorScheduler").finish_non_exhaustive()
    }
}

impl MonitorScheduler {
    /// Creates a scheduler with no loops running.
    #[must_use]
    pub fn new(monitor: Arc<HealthMonitor>) -> Self {
        Self { monitor, handles: Mutex::new(HashMap::new()) }
    }

    /// Starts the periodic check loop for a system.
    ///
    /// Restarting an already scheduled system replaces its loop.
    pub async fn schedule(&self, system_id: &str, interval_secs: u64) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());
        let monitor = Arc::clone(&self.monitor);
        let id = system_id.to_string();

        tokio::spawn(async move {
            info!(system_id = %id, interval_secs, "Health monitoring started");
            let mut interval = time::interval(Duration::from_secs(interval_secs));
            // The first tick fires immediately; skip it so creation and the
            // first check are distinct observable steps.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!(system_id = %id, "Health monitoring stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = monitor.perform_health_check(&id).await {
                            warn!(system_id = %id, error = %e, "Scheduled health check failed");
                        }
                    }
                }
            }
        });

        if let Some(previous) = self
            .handles
            .lock()
            .await
            .insert(system_id.to_string(), shutdown_tx)
        {
            let _ = previous.send(());
        }
    }

    /// Stops the check loop for a system, if one is running.
    pub async fn cancel(&self, system_id: &str) {
        if let Some(shutdown_tx) = self.handles.lock().await.remove(system_id) {
            let _ = shutdown_tx.send(());
        }
    }

    /// Whether a loop is currently scheduled for the system.
    pub async fn is_scheduled(&self, system_id: &str) -> bool {
        self.handles.lock().await.contains_key(system_id)
    }
}
