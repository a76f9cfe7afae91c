//! Orchestration engine for autonomous systems.
//!
//! The [`Warden`] facade wires the storage backend, clock, event bus, and
//! escalation notifier into the component set: system registry, health
//! monitor, task executor, decision engine, dependency resolver,
//! optimization coordinator, and the background dispatcher. Components are
//! plain structs passed by reference; there is no global state.

pub mod decision;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod health;
pub mod optimizer;
pub mod registry;
pub mod resolver;

pub use decision::{should_require_human_review, validate, DecisionEngine};
pub use dispatcher::{Dispatcher, TickSummary};
pub use error::{OrchestrationError, Result};
pub use executor::TaskExecutor;
pub use health::{HealthMetrics, HealthMonitor, HealthReport, MonitorScheduler};
pub use optimizer::OptimizationCoordinator;
pub use registry::SystemRegistry;
pub use resolver::{ensure_acyclic, DependencyResolver};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use warden_core::clock::{Clock, SystemClock};
use warden_core::config::WardenConfig;
use warden_core::events::{AuditRecord, EscalationNotifier, EventBus, LoggingNotifier};
use warden_core::models::{
    AutonomousSystem, DecisionSpec, SystemStatus, SystemType, TaskSpec, WorkItem, WorkItemSpec,
};
use warden_core::storage::{MemoryStore, Store};

/// Condensed status view of one system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemOverview {
    /// Id of the system.
    pub id: String,
    /// Current lifecycle status.
    pub status: SystemStatus,
    /// Weighted health score.
    pub health_score: u8,
    /// Derived automation percentage.
    pub automation_percentage: u8,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// An external signal submitted through the facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TriggerPayload {
    /// A schedule tick or external event carrying a work-item spec.
    WorkItem(WorkItemSpec),
    /// An external uptime measurement for the system.
    UptimeSignal {
        /// Uptime percentage, clamped to [0, 100].
        uptime: f64,
    },
}

/// Top-level orchestrator wiring all components over shared state.
pub struct Warden {
    config: WardenConfig,
    events: EventBus,
    registry: Arc<SystemRegistry>,
    monitor: Arc<HealthMonitor>,
    scheduler: MonitorScheduler,
    executor: Arc<TaskExecutor>,
    decisions: DecisionEngine,
    resolver: Arc<DependencyResolver>,
    optimizer: OptimizationCoordinator,
    dispatcher: Arc<Dispatcher>,
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warden").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Warden {
    /// Creates a fully wired orchestrator over in-memory storage, the wall
    /// clock, and the logging notifier.
    #[must_use]
    pub fn new(config: WardenConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            Arc::new(LoggingNotifier),
        )
    }

    /// Creates an orchestrator over explicit collaborators.
    ///
    /// Tests use this with [`warden_core::clock::ManualClock`] and
    /// [`warden_core::events::RecordingNotifier`].
    #[must_use]
    pub fn with_parts(
        config: WardenConfig,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn EscalationNotifier>,
    ) -> Self {
        let events = EventBus::default();
        let registry =
            Arc::new(SystemRegistry::new(store.clone(), clock.clone(), events.clone()));
        let monitor = Arc::new(HealthMonitor::new(
            store.clone(),
            registry.clone(),
            clock.clone(),
            events.clone(),
            notifier.clone(),
            config.health.clone(),
        ));
        let scheduler = MonitorScheduler::new(monitor.clone());
        let executor = Arc::new(TaskExecutor::new(
            store.clone(),
            clock.clone(),
            events.clone(),
            notifier.clone(),
            config.retry.clone(),
        ));
        let decisions =
            DecisionEngine::new(store.clone(), clock.clone(), events.clone(), notifier);
        let resolver =
            Arc::new(DependencyResolver::new(store.clone(), clock.clone(), events.clone()));
        let optimizer = OptimizationCoordinator::new(
            store.clone(),
            clock,
            events.clone(),
            resolver.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            store,
            executor.clone(),
            resolver.clone(),
            events.clone(),
            config.dispatcher.clone(),
        ));

        Self {
            config,
            events,
            registry,
            monitor,
            scheduler,
            executor,
            decisions,
            resolver,
            optimizer,
            dispatcher,
        }
    }

    /// Starts the background dispatcher.
    ///
    /// # Errors
    /// Returns `Validation` if already running.
    pub fn start(&self) -> Result<()> {
        self.dispatcher.start()
    }

    /// Stops the dispatcher and every health-monitoring loop.
    pub async fn shutdown(&self) {
        let _ = self.dispatcher.stop();
        for system in self.registry.list_systems(None).await.unwrap_or_default() {
            self.scheduler.cancel(&system.id).await;
        }
        info!("Orchestrator shut down");
    }

    /// Registers a system, schedules its health monitoring at the configured
    /// check interval, and activates it.
    ///
    /// # Errors
    /// Returns `Validation` for an empty name.
    pub async fn create_system(
        &self,
        name: &str,
        system_type: SystemType,
    ) -> Result<AutonomousSystem> {
        let system = self.registry.create_system(name, system_type).await?;
        let system = self
            .registry
            .set_monitoring_interval(&system.id, self.config.health.check_interval_secs)
            .await?;
        if system.monitoring.enabled {
            self.scheduler.schedule(&system.id, system.monitoring.interval_secs).await;
        }
        self.registry.activate(&system.id).await
    }

    /// Deletes a system, stopping its monitoring first and cascading its
    /// work items and edges.
    ///
    /// # Errors
    /// Returns `SystemNotFound` if absent.
    pub async fn delete_system(&self, system_id: &str) -> Result<()> {
        self.scheduler.cancel(system_id).await;
        self.registry.delete_system(system_id).await
    }

    /// Merges a capability patch into a system.
    ///
    /// # Errors
    /// Returns `SystemNotFound` if absent.
    pub async fn update_capabilities(
        &self,
        system_id: &str,
        patch: &BTreeMap<String, bool>,
    ) -> Result<AutonomousSystem> {
        self.registry.update_capabilities(system_id, patch).await
    }

    /// Lists systems, optionally filtered by status.
    ///
    /// # Errors
    /// Returns a storage error if the backend fails.
    pub async fn list_systems(
        &self,
        status: Option<SystemStatus>,
    ) -> Result<Vec<AutonomousSystem>> {
        self.registry.list_systems(status).await
    }

    /// Fetches a condensed status view of a system.
    ///
    /// # Errors
    /// Returns `SystemNotFound` if absent.
    pub async fn get_system_status(&self, system_id: &str) -> Result<SystemOverview> {
        let system = self.registry.get_system(system_id).await?;
        Ok(SystemOverview {
            id: system.id,
            status: system.status,
            health_score: system.health_score,
            automation_percentage: system.automation_percentage,
            updated_at: system.updated_at,
        })
    }

    /// Submits a task for a system.
    ///
    /// # Errors
    /// See [`TaskExecutor::submit_task`].
    pub async fn submit_task(&self, system_id: &str, spec: &TaskSpec) -> Result<WorkItem> {
        self.executor.submit_task(system_id, spec).await
    }

    /// Evaluates a decision for a system.
    ///
    /// # Errors
    /// See [`DecisionEngine::evaluate`].
    pub async fn submit_decision(&self, system_id: &str, spec: &DecisionSpec) -> Result<WorkItem> {
        self.decisions.evaluate(system_id, spec).await
    }

    /// Schedules an optimization for a system.
    ///
    /// # Errors
    /// See [`OptimizationCoordinator::schedule_optimization`].
    pub async fn schedule_optimization(
        &self,
        system_id: &str,
        optimization_type: &str,
    ) -> Result<WorkItem> {
        self.optimizer.schedule_optimization(system_id, optimization_type).await
    }

    /// Runs an on-demand health check for a system.
    ///
    /// # Errors
    /// Returns `SystemNotFound` if absent.
    pub async fn perform_health_check(&self, system_id: &str) -> Result<HealthReport> {
        self.monitor.perform_health_check(system_id).await
    }

    /// Converts an external trigger into the matching operation.
    ///
    /// Work-item triggers create the corresponding work item; uptime
    /// signals update the system's monitoring configuration and create
    /// nothing.
    ///
    /// # Errors
    /// Propagates the underlying submission error.
    pub async fn submit_trigger(
        &self,
        system_id: &str,
        payload: TriggerPayload,
    ) -> Result<Option<WorkItem>> {
        match payload {
            TriggerPayload::WorkItem(WorkItemSpec::Task(spec)) => {
                Ok(Some(self.submit_task(system_id, &spec).await?))
            }
            TriggerPayload::WorkItem(WorkItemSpec::Decision(spec)) => {
                Ok(Some(self.submit_decision(system_id, &spec).await?))
            }
            TriggerPayload::WorkItem(WorkItemSpec::Optimization { optimization_type }) => {
                Ok(Some(self.schedule_optimization(system_id, &optimization_type).await?))
            }
            TriggerPayload::UptimeSignal { uptime } => {
                self.registry.record_uptime(system_id, uptime).await?;
                Ok(None)
            }
        }
    }

    /// Subscribes to the audit event stream.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AuditRecord> {
        self.events.subscribe()
    }

    /// The system registry.
    #[must_use]
    pub fn registry(&self) -> &SystemRegistry {
        &self.registry
    }

    /// The task executor.
    #[must_use]
    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    /// The decision engine.
    #[must_use]
    pub fn decisions(&self) -> &DecisionEngine {
        &self.decisions
    }

    /// The dependency resolver.
    #[must_use]
    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// The optimization coordinator.
    #[must_use]
    pub fn optimizer(&self) -> &OptimizationCoordinator {
        &self.optimizer
    }

    /// The background dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The health-monitor scheduler.
    #[must_use]
    pub fn monitor_scheduler(&self) -> &MonitorScheduler {
        &self.scheduler
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &WardenConfig {
        &self.config
    }
}
