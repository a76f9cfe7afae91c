//! Optimization lifecycle coordination.
//!
//! Optimizations walk a linear analyzing → planning → implementing → testing
//! → completed lifecycle. Implementation is gated twice: the simulation must
//! have passed, and any conflicts with concurrently running optimizations
//! must be resolved. Concurrent optimizations on one system are linked with
//! resource-conflict edges so the resolver arbitrates between them.

use crate::error::{OrchestrationError, Result};
use crate::resolver::{ensure_acyclic, DependencyResolver};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use warden_core::clock::Clock;
use warden_core::events::{AuditEvent, EventBus, Severity};
use warden_core::machine::transition;
use warden_core::models::{
    DependencyEdge, DependencyStrength, DependencyType, OptimizationItem, OptimizationStatus,
    Priority, WorkItem, WorkItemPayload,
};
use warden_core::storage::{StorageError, Store};

/// Drives optimization work items through their lifecycle.
pub struct OptimizationCoordinator {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    resolver: Arc<DependencyResolver>,
}

impl std::fmt::Debug for OptimizationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizationCoordinator").finish_non_exhaustive()
    }
}

impl OptimizationCoordinator {
    /// Creates a new coordinator.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        resolver: Arc<DependencyResolver>,
    ) -> Self {
        Self { store, clock, events, resolver }
    }

    /// Schedules an optimization for a system, starting in `analyzing`.
    ///
    /// Any optimization already in flight for the same system gets linked to
    /// the new one with a resource-conflict edge, so the two contend through
    /// the resolver rather than silently running over each other.
    ///
    /// # Errors
    /// Returns `Validation` for an empty type or `SystemNotFound`.
    pub async fn schedule_optimization(
        &self,
        system_id: &str,
        optimization_type: &str,
    ) -> Result<WorkItem> {
        if optimization_type.trim().is_empty() {
            return Err(OrchestrationError::Validation(
                "optimization type cannot be empty".to_string(),
            ));
        }
        match self.store.get_system(system_id).await {
            Ok(_) => {}
            Err(StorageError::NotFound(_)) => {
                return Err(OrchestrationError::SystemNotFound(system_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let now = self.clock.now();
        let id = format!("opt-{}", Uuid::new_v4());
        let item = WorkItem::new(
            id.clone(),
            system_id.to_string(),
            Priority::Normal,
            WorkItemPayload::Optimization(OptimizationItem::new(optimization_type.to_string())),
            now,
        );

        let in_flight: Vec<WorkItem> = self
            .store
            .list_work_items_for_system(system_id)
            .await?
            .into_iter()
            .filter(|other| {
                other.as_optimization().is_some_and(|o| !matches!(
                    o.status,
                    OptimizationStatus::Completed | OptimizationStatus::Aborted
                ))
            })
            .collect();

        let existing = self.store.list_edges().await?;
        for other in &in_flight {
            ensure_acyclic(&existing, &id, &other.id)?;
        }

        self.store.insert_work_item(item.clone()).await?;
        for other in &in_flight {
            let edge = DependencyEdge::new(
                format!("edge-{}", Uuid::new_v4()),
                id.clone(),
                other.id.clone(),
                DependencyType::ResourceConflict,
                // Critical strength: never auto-resolved while both run.
                DependencyStrength::Critical,
                now,
            );
            self.store.insert_edge(edge).await?;
        }

        info!(
            item_id = %id,
            system_id = %system_id,
            optimization_type = %optimization_type,
            concurrent = in_flight.len(),
            "Optimization scheduled"
        );
        Ok(item)
    }

    /// Moves an optimization from analyzing to planning.
    ///
    /// # Errors
    /// Returns `InvalidTransition` from any other phase.
    pub async fn begin_planning(&self, item_id: &str) -> Result<WorkItem> {
        let item = self.get_optimization_item(item_id).await?;
        self.apply(item, OptimizationStatus::Planning, |_, _| {}).await
    }

    /// Records the outcome of the pre-implementation simulation.
    ///
    /// # Errors
    /// Returns `WorkItemNotFound` or `Validation` for non-optimizations.
    pub async fn record_simulation(&self, item_id: &str, passed: bool) -> Result<WorkItem> {
        let mut item = self.get_optimization_item(item_id).await?;
        let now = self.clock.now();
        let opt = item
            .as_optimization_mut()
            .ok_or_else(|| OrchestrationError::Validation("not an optimization".to_string()))?;
        opt.validation.simulation_passed = Some(passed);
        opt.validation.simulated_at = Some(now);
        item.touch(now);
        info!(item_id = %item_id, passed, "Simulation recorded");
        Ok(self.store.update_work_item(item).await?)
    }

    /// Moves a planned optimization into implementation.
    ///
    /// Gated on a passing simulation and on resolution of any conflicts with
    /// concurrent optimizations. A failed gate leaves the item in planning.
    ///
    /// # Errors
    /// Returns `Validation` when either gate fails, `InvalidTransition` when
    /// not planning.
    pub async fn begin_implementation(&self, item_id: &str) -> Result<WorkItem> {
        let item = self.get_optimization_item(item_id).await?;
        let opt = optimization_payload(&item)?;

        if opt.validation.simulation_passed != Some(true) {
            warn!(item_id = %item_id, "Implementation blocked: simulation has not passed");
            return Err(OrchestrationError::Validation(format!(
                "optimization {item_id} requires a passing simulation before implementation"
            )));
        }

        let edges = self.resolver.check_dependencies_for(item_id).await?;
        if edges.iter().any(DependencyEdge::is_blocking) {
            warn!(item_id = %item_id, "Implementation blocked: unresolved optimization conflicts");
            return Err(OrchestrationError::Validation(format!(
                "optimization {item_id} has unresolved conflicts with concurrent optimizations"
            )));
        }

        self.apply(item, OptimizationStatus::Implementing, |_, _| {}).await
    }

    /// Moves an implemented optimization into testing.
    ///
    /// # Errors
    /// Returns `InvalidTransition` from any other phase.
    pub async fn begin_testing(&self, item_id: &str) -> Result<WorkItem> {
        let item = self.get_optimization_item(item_id).await?;
        self.apply(item, OptimizationStatus::Testing, |_, _| {}).await
    }

    /// Completes a tested optimization and clears any conflict edges that
    /// rivals hold against it.
    ///
    /// # Errors
    /// Returns `InvalidTransition` from any other phase.
    pub async fn complete(&self, item_id: &str) -> Result<WorkItem> {
        let item = self.get_optimization_item(item_id).await?;
        let updated = self.apply(item, OptimizationStatus::Completed, |_, _| {}).await?;
        self.resolver.check_dependents_of(item_id).await?;
        Ok(updated)
    }

    /// Aborts an optimization from any non-terminal phase and clears any
    /// conflict edges that rivals hold against it.
    ///
    /// # Errors
    /// Returns `InvalidTransition` once completed or already aborted.
    pub async fn abort(&self, item_id: &str, reason: &str) -> Result<WorkItem> {
        let item = self.get_optimization_item(item_id).await?;
        let reason = reason.to_string();
        warn!(item_id = %item_id, reason = %reason, "Optimization aborted");
        let updated = self
            .apply(item, OptimizationStatus::Aborted, |opt, _| {
                opt.abort_reason = Some(reason);
            })
            .await?;
        self.resolver.check_dependents_of(item_id).await?;
        Ok(updated)
    }

    async fn apply<F>(
        &self,
        mut item: WorkItem,
        to: OptimizationStatus,
        mutate: F,
    ) -> Result<WorkItem>
    where
        F: FnOnce(&mut OptimizationItem, DateTime<Utc>),
    {
        let now = self.clock.now();
        let from_label = item.status_label();
        let from = optimization_payload(&item)?.status;
        let next = transition(&item.id, from, to)?;

        let opt = item
            .as_optimization_mut()
            .ok_or_else(|| OrchestrationError::Validation("not an optimization".to_string()))?;
        opt.status = next;
        mutate(opt, now);
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

    async fn get_optimization_item(&self, id: &str) -> Result<WorkItem> {
        match self.store.get_work_item(id).await {
            Ok(item) => Ok(item),
            Err(StorageError::NotFound(_)) => {
                Err(OrchestrationError::WorkItemNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn optimization_payload(item: &WorkItem) -> Result<&OptimizationItem> {
    item.as_optimization()
        .ok_or_else(|| OrchestrationError::Validation(format!("{} is not an optimization", item.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::clock::ManualClock;
    use warden_core::models::{AutonomousSystem, SystemType};
    use warden_core::storage::{EdgeStore, MemoryStore, SystemStore, WorkItemStore};

    struct Fixture {
        coordinator: OptimizationCoordinator,
        store: Arc<MemoryStore>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::epoch());
        let events = EventBus::default();
        store
            .insert_system(AutonomousSystem::new(
                "sys-1".to_string(),
                "optimizer".to_string(),
                SystemType::WorkflowOrchestrator,
                clock.now(),
            ))
            .await
            .unwrap();
        let resolver =
            Arc::new(DependencyResolver::new(store.clone(), clock.clone(), events.clone()));
        let coordinator = OptimizationCoordinator::new(store.clone(), clock, events, resolver);
        Fixture { coordinator, store }
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let f = fixture().await;
        let item = f
            .coordinator
            .schedule_optimization("sys-1", "query_latency")
            .await
            .unwrap();
        assert_eq!(item.status_label(), "analyzing");

        f.coordinator.begin_planning(&item.id).await.unwrap();
        f.coordinator.record_simulation(&item.id, true).await.unwrap();
        f.coordinator.begin_implementation(&item.id).await.unwrap();
        f.coordinator.begin_testing(&item.id).await.unwrap();
        let done = f.coordinator.complete(&item.id).await.unwrap();
        assert_eq!(done.as_optimization().unwrap().status, OptimizationStatus::Completed);
    }

    #[tokio::test]
    async fn test_implementation_gated_on_simulation() {
        let f = fixture().await;
        let item = f.coordinator.schedule_optimization("sys-1", "memory").await.unwrap();
        f.coordinator.begin_planning(&item.id).await.unwrap();

        // No simulation recorded.
        let err = f.coordinator.begin_implementation(&item.id).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation(_)));

        // Failed simulation stays in planning.
        f.coordinator.record_simulation(&item.id, false).await.unwrap();
        let err = f.coordinator.begin_implementation(&item.id).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation(_)));
        let current = f.store.get_work_item(&item.id).await.unwrap();
        assert_eq!(current.as_optimization().unwrap().status, OptimizationStatus::Planning);

        // Passing simulation unlocks the gate.
        f.coordinator.record_simulation(&item.id, true).await.unwrap();
        let implementing = f.coordinator.begin_implementation(&item.id).await.unwrap();
        assert_eq!(
            implementing.as_optimization().unwrap().status,
            OptimizationStatus::Implementing
        );
    }

    #[tokio::test]
    async fn test_concurrent_optimizations_get_conflict_edge() {
        let f = fixture().await;
        let first = f.coordinator.schedule_optimization("sys-1", "cpu").await.unwrap();
        let second = f.coordinator.schedule_optimization("sys-1", "io").await.unwrap();

        let edges = f.store.edges_for_source(&second.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, DependencyType::ResourceConflict);
        assert_eq!(edges[0].depends_on_id, first.id);

        // The conflict blocks implementation until the first settles.
        f.coordinator.begin_planning(&second.id).await.unwrap();
        f.coordinator.record_simulation(&second.id, true).await.unwrap();
        let err = f.coordinator.begin_implementation(&second.id).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation(_)));

        // Abort the first; the conflict edge clears as part of the abort.
        f.coordinator.abort(&first.id, "superseded").await.unwrap();
        let edges = f.store.edges_for_source(&second.id).await.unwrap();
        assert!(!edges[0].is_blocking());
        f.coordinator.begin_implementation(&second.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_abort_records_reason_and_is_terminal() {
        let f = fixture().await;
        let item = f.coordinator.schedule_optimization("sys-1", "gc").await.unwrap();
        let aborted = f.coordinator.abort(&item.id, "not worth it").await.unwrap();
        assert_eq!(aborted.as_optimization().unwrap().abort_reason.as_deref(), Some("not worth it"));

        let err = f.coordinator.begin_planning(&item.id).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_cannot_skip_phases() {
        let f = fixture().await;
        let item = f.coordinator.schedule_optimization("sys-1", "index").await.unwrap();
        f.coordinator.record_simulation(&item.id, true).await.unwrap();

        // Still analyzing; implementing requires planning first.
        let err = f.coordinator.begin_implementation(&item.id).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidTransition(_)));
    }
}
