//! System registry.
//!
//! Owns the lifecycle of autonomous system records: registration, status
//! transitions, capability patches, and cascading deletion of a system's
//! work items and edges.

use crate::error::{OrchestrationError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::clock::Clock;
use warden_core::events::{AuditEvent, EventBus, Severity};
use warden_core::models::{AutonomousSystem, PerformanceMetrics, SystemStatus, SystemType};
use warden_core::storage::{StorageError, Store};

/// Registry for autonomous system records.
pub struct SystemRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl std::fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemRegistry").finish_non_exhaustive()
    }
}

impl SystemRegistry {
    /// Creates a new registry.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self { store, clock, events }
    }

    /// Registers a new system in `Initializing` status.
    ///
    /// Capabilities are seeded from the system type and the automation
    /// percentage derived from them.
    ///
    /// # Errors
    /// Returns `OrchestrationError::Validation` if the name is empty.
    pub async fn create_system(
        &self,
        name: &str,
        system_type: SystemType,
    ) -> Result<AutonomousSystem> {
        let now = self.clock.now();
        let id = format!("sys-{}", Uuid::new_v4());
        let system = AutonomousSystem::new(id.clone(), name.to_string(), system_type, now);
        system
            .validate()
            .map_err(|e| OrchestrationError::Validation(e.to_string()))?;

        self.store.insert_system(system.clone()).await?;
        info!(
            system_id = %id,
            system_type = %system_type.as_str(),
            automation = system.automation_percentage,
            "System registered"
        );
        self.events
            .emit(AuditEvent::SystemCreated { system_id: id }, Severity::Info, now);
        Ok(system)
    }

    /// Fetches a system by id.
    ///
    /// # Errors
    /// Returns `OrchestrationError::SystemNotFound` if it does not exist.
    pub async fn get_system(&self, id: &str) -> Result<AutonomousSystem> {
        match self.store.get_system(id).await {
            Ok(system) => Ok(system),
            Err(StorageError::NotFound(_)) => {
                Err(OrchestrationError::SystemNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Lists systems ordered by creation time, optionally filtered by
    /// status.
    ///
    /// # Errors
    /// Returns a storage error if the backend fails.
    pub async fn list_systems(
        &self,
        status: Option<SystemStatus>,
    ) -> Result<Vec<AutonomousSystem>> {
        let mut systems = self.store.list_systems().await?;
        if let Some(status) = status {
            systems.retain(|s| s.status == status);
        }
        Ok(systems)
    }

    /// Transitions a system to a new status.
    ///
    /// # Errors
    /// Returns `OrchestrationError::InvalidSystemTransition` if the target
    /// is not reachable from the current status.
    pub async fn transition_status(&self, id: &str, to: SystemStatus) -> Result<AutonomousSystem> {
        let mut system = self.get_system(id).await?;
        let from = system.status;
        if !from.can_transition_to(to) {
            warn!(system_id = %id, from = from.as_str(), to = to.as_str(), "Invalid system transition");
            return Err(OrchestrationError::InvalidSystemTransition {
                system_id: id.to_string(),
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        let now = self.clock.now();
        system.status = to;
        system.updated_at = now;
        self.store.update_system(system.clone()).await?;

        info!(system_id = %id, from = from.as_str(), to = to.as_str(), "System status changed");
        self.events.emit(
            AuditEvent::SystemStatusChanged {
                system_id: id.to_string(),
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            },
            Severity::Info,
            now,
        );
        Ok(system)
    }

    /// Activates a system (`initializing` or `maintenance` to `active`).
    ///
    /// # Errors
    /// Returns `OrchestrationError::InvalidSystemTransition` if the system
    /// cannot become active from its current status.
    pub async fn activate(&self, id: &str) -> Result<AutonomousSystem> {
        self.transition_status(id, SystemStatus::Active).await
    }

    /// Returns a system escalated into maintenance to active duty.
    ///
    /// The health score is reset to a clean slate; the next health check
    /// recomputes it from current work-item outcomes.
    ///
    /// # Errors
    /// Returns `OrchestrationError::InvalidSystemTransition` if the system
    /// is not in maintenance.
    pub async fn resume_system(&self, id: &str) -> Result<AutonomousSystem> {
        let system = self.get_system(id).await?;
        if system.status != SystemStatus::Maintenance {
            return Err(OrchestrationError::InvalidSystemTransition {
                system_id: id.to_string(),
                from: system.status.as_str().to_string(),
                to: SystemStatus::Active.as_str().to_string(),
            });
        }
        let mut system = self.transition_status(id, SystemStatus::Active).await?;
        system.record_health_score(100, self.clock.now());
        self.store.update_system(system.clone()).await?;
        Ok(system)
    }

    /// Merges a capability patch into a system's capability map.
    ///
    /// Flags absent from the patch are left untouched; the automation
    /// percentage is recomputed in the same update.
    ///
    /// # Errors
    /// Returns `OrchestrationError::SystemNotFound` if the system does not
    /// exist.
    pub async fn update_capabilities(
        &self,
        id: &str,
        patch: &BTreeMap<String, bool>,
    ) -> Result<AutonomousSystem> {
        let mut system = self.get_system(id).await?;
        let now = self.clock.now();
        system.apply_capability_patch(patch, now);
        self.store.update_system(system.clone()).await?;

        info!(
            system_id = %id,
            automation = system.automation_percentage,
            "Capabilities updated"
        );
        self.events.emit(
            AuditEvent::CapabilitiesUpdated {
                system_id: id.to_string(),
                automation_percentage: system.automation_percentage,
            },
            Severity::Info,
            now,
        );
        Ok(system)
    }

    /// Persists a health score and performance aggregates computed by the
    /// health monitor.
    ///
    /// # Errors
    /// Returns `OrchestrationError::SystemNotFound` if the system does not
    /// exist.
    pub async fn record_health(
        &self,
        id: &str,
        score: u8,
        performance: PerformanceMetrics,
    ) -> Result<AutonomousSystem> {
        let mut system = self.get_system(id).await?;
        system.performance = performance;
        system.record_health_score(score, self.clock.now());
        self.store.update_system(system.clone()).await?;
        Ok(system)
    }

    /// Sets how often a system's health is checked.
    ///
    /// # Errors
    /// Returns `OrchestrationError::SystemNotFound` if the system does not
    /// exist.
    pub async fn set_monitoring_interval(
        &self,
        id: &str,
        interval_secs: u64,
    ) -> Result<AutonomousSystem> {
        let mut system = self.get_system(id).await?;
        system.monitoring.interval_secs = interval_secs;
        system.updated_at = self.clock.now();
        self.store.update_system(system.clone()).await?;
        debug!(system_id = %id, interval_secs, "Monitoring interval set");
        Ok(system)
    }

    /// Records an externally reported uptime signal.
    ///
    /// The value feeds the next health check; it is clamped to [0, 100].
    ///
    /// # Errors
    /// Returns `OrchestrationError::SystemNotFound` if the system does not
    /// exist.
    pub async fn record_uptime(&self, id: &str, uptime: f64) -> Result<AutonomousSystem> {
        let mut system = self.get_system(id).await?;
        system.monitoring.uptime = uptime.clamp(0.0, 100.0);
        system.updated_at = self.clock.now();
        self.store.update_system(system.clone()).await?;
        debug!(system_id = %id, uptime = system.monitoring.uptime, "Uptime signal recorded");
        Ok(system)
    }

    /// Deletes a system and everything it owns.
    ///
    /// All of the system's work items are removed, along with every
    /// dependency edge touching any of them, in either direction. No
    /// dangling edge survives the cascade.
    ///
    /// # Errors
    /// Returns `OrchestrationError::SystemNotFound` if the system does not
    /// exist.
    pub async fn delete_system(&self, id: &str) -> Result<()> {
        // Existence check first so the cascade never runs for a bad id.
        self.get_system(id).await?;

        let owned = self.store.list_work_items_for_system(id).await?;
        let mut edges_removed = 0;
        for item in &owned {
            edges_removed += self.store.delete_edges_touching(&item.id).await?;
            self.store.delete_work_item(&item.id).await?;
        }
        self.store.delete_system(id).await?;

        info!(
            system_id = %id,
            work_items = owned.len(),
            edges = edges_removed,
            "System deleted with cascade"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::clock::ManualClock;
    use warden_core::storage::MemoryStore;

    fn registry() -> SystemRegistry {
        SystemRegistry::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::epoch()),
            EventBus::default(),
        )
    }

    #[tokio::test]
    async fn test_create_system_seeds_capabilities() {
        let registry = registry();
        let system = registry
            .create_system("compliance", SystemType::ComplianceMonitor)
            .await
            .unwrap();

        assert_eq!(system.status, SystemStatus::Initializing);
        assert_eq!(system.health_score, 100);
        // compliance_monitor enables 4 of 6 flags.
        assert_eq!(system.automation_percentage, 67);
        assert!(system.id.starts_with("sys-"));
    }

    #[tokio::test]
    async fn test_create_system_rejects_empty_name() {
        let registry = registry();
        let err = registry.create_system("", SystemType::AutoHealer).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_activate_and_retire() {
        let registry = registry();
        let system = registry.create_system("healer", SystemType::AutoHealer).await.unwrap();

        let active = registry.activate(&system.id).await.unwrap();
        assert_eq!(active.status, SystemStatus::Active);

        let retired = registry
            .transition_status(&system.id, SystemStatus::Retired)
            .await
            .unwrap();
        assert_eq!(retired.status, SystemStatus::Retired);

        // Retired is terminal.
        let err = registry.activate(&system.id).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidSystemTransition { .. }));
    }

    #[tokio::test]
    async fn test_initializing_cannot_enter_maintenance() {
        let registry = registry();
        let system = registry.create_system("risk", SystemType::RiskPredictor).await.unwrap();
        let err = registry
            .transition_status(&system.id, SystemStatus::Maintenance)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidSystemTransition { .. }));
    }

    #[tokio::test]
    async fn test_update_capabilities_is_merge_only() {
        let registry = registry();
        let system = registry
            .create_system("compliance", SystemType::ComplianceMonitor)
            .await
            .unwrap();
        let flags_before = system.capabilities.len();

        let mut patch = BTreeMap::new();
        patch.insert("auto_resolution".to_string(), true);
        let updated = registry.update_capabilities(&system.id, &patch).await.unwrap();

        assert_eq!(updated.capabilities.len(), flags_before);
        assert_eq!(updated.capabilities.get("auto_resolution"), Some(&true));
        // 5 of 6 flags now enabled.
        assert_eq!(updated.automation_percentage, 83);
    }

    #[tokio::test]
    async fn test_resume_requires_maintenance() {
        let registry = registry();
        let system = registry.create_system("healer", SystemType::AutoHealer).await.unwrap();
        registry.activate(&system.id).await.unwrap();

        let err = registry.resume_system(&system.id).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidSystemTransition { .. }));

        registry
            .transition_status(&system.id, SystemStatus::Maintenance)
            .await
            .unwrap();
        let resumed = registry.resume_system(&system.id).await.unwrap();
        assert_eq!(resumed.status, SystemStatus::Active);
        assert_eq!(resumed.health_score, 100);
    }

    #[tokio::test]
    async fn test_set_monitoring_interval() {
        let registry = registry();
        let system = registry.create_system("healer", SystemType::AutoHealer).await.unwrap();

        let updated = registry.set_monitoring_interval(&system.id, 15).await.unwrap();
        assert_eq!(updated.monitoring.interval_secs, 15);

        let fetched = registry.get_system(&system.id).await.unwrap();
        assert_eq!(fetched.monitoring.interval_secs, 15);
    }

    #[tokio::test]
    async fn test_get_unknown_system() {
        let registry = registry();
        let err = registry.get_system("sys-missing").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::SystemNotFound(_)));
    }
}
