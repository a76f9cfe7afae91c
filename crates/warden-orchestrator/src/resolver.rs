//! Dependency resolution and conflict handling.
//!
//! Each edge type maps to a conflict-detection rule through a lookup table;
//! detected conflicts are pushed through one of five resolution strategies,
//! and readiness is evaluated per edge type. An edge that fails resolution
//! never becomes satisfied, and a conflicted edge always records the strategy
//! that was attempted.

use crate::error::{OrchestrationError, Result};
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::clock::Clock;
use warden_core::events::{AuditEvent, EventBus, Severity};
use warden_core::machine::{is_item_failed, is_item_settled, is_item_successful};
use warden_core::models::{
    ConflictDescriptor, ConflictSeverity, DependencyEdge, DependencyStatus, DependencyStrength,
    DependencyType, ResolutionStrategy, TaskStatus, WorkItem,
};
use warden_core::storage::{StorageError, Store};

/// Conflict-detection rule for one edge type.
type ConflictCheck = fn(&DependencyEdge, &WorkItem) -> Vec<ConflictDescriptor>;

/// Lookup table mapping edge types to their conflict rules. Types without an
/// entry never produce conflicts.
fn conflict_check_for(edge_type: DependencyType) -> Option<ConflictCheck> {
    match edge_type {
        DependencyType::ResourceConflict => Some(check_resource),
        DependencyType::ConfigurationConflict => Some(check_configuration),
        DependencyType::TestingDependency => Some(check_testing),
        DependencyType::DeploymentDependency => Some(check_deployment),
        DependencyType::Prerequisite
        | DependencyType::Sequential
        | DependencyType::Parallel
        | DependencyType::ValidationDependency => None,
    }
}

/// Edge types that only clear when the upstream item succeeds. Contention
/// edges (resource, configuration, parallel) are released by any settlement,
/// including a failed or cancelled rival.
fn requires_upstream_success(edge_type: DependencyType) -> bool {
    matches!(
        edge_type,
        DependencyType::Prerequisite
            | DependencyType::Sequential
            | DependencyType::TestingDependency
            | DependencyType::ValidationDependency
            | DependencyType::DeploymentDependency
    )
}

fn severity_from_strength(strength: DependencyStrength) -> ConflictSeverity {
    match strength {
        DependencyStrength::Weak => ConflictSeverity::Low,
        DependencyStrength::Medium => ConflictSeverity::Medium,
        DependencyStrength::Strong => ConflictSeverity::High,
        DependencyStrength::Critical => ConflictSeverity::Critical,
    }
}

/// Both items contend for a resource until the depended-on item settles.
fn check_resource(edge: &DependencyEdge, depends_on: &WorkItem) -> Vec<ConflictDescriptor> {
    if is_item_settled(depends_on) {
        return Vec::new();
    }
    vec![ConflictDescriptor {
        kind: "resource".to_string(),
        severity: severity_from_strength(edge.strength),
        detail: format!("{} still holds contended resources", depends_on.id),
    }]
}

/// Conflicting configuration is unsafe to touch until the depended-on item
/// settles.
fn check_configuration(edge: &DependencyEdge, depends_on: &WorkItem) -> Vec<ConflictDescriptor> {
    if is_item_settled(depends_on) {
        return Vec::new();
    }
    vec![ConflictDescriptor {
        kind: "configuration".to_string(),
        severity: severity_from_strength(edge.strength),
        detail: format!("{} is mutating conflicting configuration", depends_on.id),
    }]
}

/// Test results are unavailable while the depended-on item is incomplete.
fn check_testing(_edge: &DependencyEdge, depends_on: &WorkItem) -> Vec<ConflictDescriptor> {
    if is_item_successful(depends_on) {
        return Vec::new();
    }
    vec![ConflictDescriptor {
        kind: "testing".to_string(),
        severity: ConflictSeverity::Medium,
        detail: format!("test results from {} not yet available", depends_on.id),
    }]
}

/// A failed deployment upstream is a hard conflict.
fn check_deployment(_edge: &DependencyEdge, depends_on: &WorkItem) -> Vec<ConflictDescriptor> {
    if !is_item_failed(depends_on) {
        return Vec::new();
    }
    vec![ConflictDescriptor {
        kind: "deployment".to_string(),
        severity: ConflictSeverity::High,
        detail: format!("deployment {} failed", depends_on.id),
    }]
}

/// Applies one resolution strategy to the detected conflicts, returning the
/// resolution label and whether the conflicts are considered resolved.
fn resolve(
    strategy: ResolutionStrategy,
    conflicts: &[ConflictDescriptor],
) -> (&'static str, bool) {
    let has_critical = conflicts.iter().any(|c| c.severity == ConflictSeverity::Critical);
    let has_high = conflicts.iter().any(|c| c.severity == ConflictSeverity::High);
    match strategy {
        ResolutionStrategy::PriorityBased => {
            if has_critical {
                ("delay_optimization", false)
            } else if has_high {
                ("modify_optimization", true)
            } else {
                ("proceed_with_caution", true)
            }
        }
        ResolutionStrategy::ResourceBased => {
            if conflicts.iter().any(|c| c.kind == "resource") {
                ("allocate_additional_resources", true)
            } else {
                ("optimize_resource_usage", true)
            }
        }
        ResolutionStrategy::ImpactBased => {
            if has_critical {
                ("postpone_optimization", false)
            } else {
                ("proceed_with_monitoring", true)
            }
        }
        ResolutionStrategy::Sequential => ("execute_sequentially", true),
        ResolutionStrategy::Manual => ("manual_intervention_required", false),
    }
}

/// Rejects an edge set that would contain a dependency cycle.
///
/// The candidate edge is considered alongside the existing edges; the graph
/// is directed from each source to what it depends on.
///
/// # Errors
/// Returns `OrchestrationError::CycleDetected` naming the candidate source.
pub fn ensure_acyclic(
    existing: &[DependencyEdge],
    source_id: &str,
    depends_on_id: &str,
) -> Result<()> {
    if source_id == depends_on_id {
        return Err(OrchestrationError::CycleDetected(source_id.to_string()));
    }
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for edge in existing {
        graph.add_edge(edge.source_id.as_str(), edge.depends_on_id.as_str(), ());
    }
    graph.add_edge(source_id, depends_on_id, ());
    if is_cyclic_directed(&graph) {
        return Err(OrchestrationError::CycleDetected(source_id.to_string()));
    }
    Ok(())
}

/// Resolves dependency edges: conflict detection, strategy resolution, and
/// readiness evaluation.
pub struct DependencyResolver {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver").finish_non_exhaustive()
    }
}

impl DependencyResolver {
    /// Creates a new resolver.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self { store, clock, events }
    }

    /// Runs one full resolution pass on an edge: conflict detection,
    /// strategy resolution if conflicts were found, then readiness
    /// evaluation. Persists and returns the updated edge.
    ///
    /// # Errors
    /// Returns `OrchestrationError::WorkItemNotFound` if either endpoint is
    /// gone, or a storage error.
    pub async fn check_dependency(&self, edge_id: &str) -> Result<DependencyEdge> {
        let mut edge = self.store.get_edge(edge_id).await?;
        if !edge.is_blocking() {
            return Ok(edge);
        }
        let depends_on = self.get_item(&edge.depends_on_id).await?;
        let before = edge.status;

        let conflicts = conflict_check_for(edge.edge_type)
            .map(|check| check(&edge, &depends_on))
            .unwrap_or_default();

        if conflicts.is_empty() {
            edge.conflict.has_conflict = false;
            edge.conflict.conflicts.clear();
            self.evaluate_dependency(&mut edge, &depends_on);
        } else {
            let strategy = edge.conflict.strategy.unwrap_or_default();
            let (resolution, resolved) = resolve(strategy, &conflicts);
            debug!(
                edge_id = %edge.id,
                strategy = ?strategy,
                resolution,
                resolved,
                "Conflict resolution attempted"
            );
            edge.status = DependencyStatus::Conflicted;
            edge.conflict.has_conflict = true;
            edge.conflict.strategy = Some(strategy);
            edge.conflict.resolved = resolved;
            edge.conflict.resolution = Some(resolution.to_string());
            edge.conflict.conflicts = conflicts;
            if resolved {
                self.evaluate_dependency(&mut edge, &depends_on);
            } else {
                warn!(edge_id = %edge.id, resolution, "Conflict not auto-resolved");
            }
        }

        if edge.status != before {
            self.emit_status(&edge);
        }
        self.store.update_edge(edge.clone()).await?;
        Ok(edge)
    }

    /// Runs [`Self::check_dependency`] over every edge gating the given work
    /// item, returning the updated edges.
    ///
    /// # Errors
    /// Propagates the first per-edge failure.
    pub async fn check_dependencies_for(&self, source_id: &str) -> Result<Vec<DependencyEdge>> {
        let edges = self.store.edges_for_source(source_id).await?;
        let mut updated = Vec::with_capacity(edges.len());
        for edge in edges {
            updated.push(self.check_dependency(&edge.id).await?);
        }
        Ok(updated)
    }

    /// Runs [`Self::check_dependency`] over every edge that depends on the
    /// given work item. Called when an item settles, so downstream edges
    /// (conflict edges against a finished rival in particular) clear without
    /// waiting for the next poll.
    ///
    /// # Errors
    /// Propagates the first per-edge failure.
    pub async fn check_dependents_of(&self, item_id: &str) -> Result<Vec<DependencyEdge>> {
        let edges = self.store.edges_depending_on(item_id).await?;
        let mut updated = Vec::with_capacity(edges.len());
        for edge in edges {
            updated.push(self.check_dependency(&edge.id).await?);
        }
        Ok(updated)
    }

    /// Applies type-specific readiness rules to an edge.
    ///
    /// Satisfied edges get a timestamp; success-requiring edges whose
    /// upstream failed or timed out take the matching terminal status;
    /// anything else is left as is.
    fn evaluate_dependency(&self, edge: &mut DependencyEdge, depends_on: &WorkItem) {
        let now = self.clock.now();

        // Upstream terminal failures only propagate where success is
        // required; contention edges are released by any settlement.
        if requires_upstream_success(edge.edge_type) {
            if let Some(task) = depends_on.as_task() {
                if task.status == TaskStatus::Timeout {
                    edge.status = DependencyStatus::Timeout;
                    return;
                }
            }
            if is_item_failed(depends_on) {
                edge.status = DependencyStatus::Failed;
                return;
            }
        }

        let ready = match edge.edge_type {
            DependencyType::Prerequisite => {
                is_item_successful(depends_on) && edge.conditions.iter().all(|c| c.met)
            }
            DependencyType::Sequential => {
                edge.order.is_some_and(|o| o >= 1) && is_item_successful(depends_on)
            }
            DependencyType::Parallel => edge.conflict.conflicts.is_empty(),
            DependencyType::ResourceConflict | DependencyType::ConfigurationConflict => {
                // No outstanding conflicts, or a non-manual resolution.
                edge.conflict.conflicts.is_empty()
                    || (edge.conflict.resolved
                        && edge.conflict.resolution.as_deref()
                            != Some("manual_intervention_required"))
            }
            DependencyType::TestingDependency
            | DependencyType::ValidationDependency
            | DependencyType::DeploymentDependency => is_item_successful(depends_on),
        };

        if ready {
            edge.status = DependencyStatus::Satisfied;
            edge.satisfied_at = Some(now);
            info!(edge_id = %edge.id, "Dependency satisfied");
        }
    }

    /// Marks an edge as explicitly skipped (operator override).
    ///
    /// # Errors
    /// Returns a storage error if the edge does not exist.
    pub async fn skip_dependency(&self, edge_id: &str) -> Result<DependencyEdge> {
        let mut edge = self.store.get_edge(edge_id).await?;
        edge.status = DependencyStatus::Skipped;
        self.store.update_edge(edge.clone()).await?;
        self.emit_status(&edge);
        Ok(edge)
    }

    fn emit_status(&self, edge: &DependencyEdge) {
        let status = match edge.status {
            DependencyStatus::Pending => "pending",
            DependencyStatus::Satisfied => "satisfied",
            DependencyStatus::Failed => "failed",
            DependencyStatus::Timeout => "timeout",
            DependencyStatus::Skipped => "skipped",
            DependencyStatus::Conflicted => "conflicted",
        };
        self.events.emit(
            AuditEvent::DependencyStatusChanged {
                edge_id: edge.id.clone(),
                status: status.to_string(),
            },
            Severity::Info,
            self.clock.now(),
        );
    }

    async fn get_item(&self, id: &str) -> Result<WorkItem> {
        match self.store.get_work_item(id).await {
            Ok(item) => Ok(item),
            Err(StorageError::NotFound(_)) => {
                Err(OrchestrationError::WorkItemNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
