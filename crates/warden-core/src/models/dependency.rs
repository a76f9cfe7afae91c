//! Dependency edges between work items.
//!
//! A [`DependencyEdge`] is a directed relation from one work item (the
//! source) to another it depends on. Edges carry a type, a strength, and a
//! conflict-resolution state; they are mutated only by the dependency
//! resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type of dependency relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Source may not start until the dependency completes.
    Prerequisite,
    /// Source must execute after the dependency, in listed order.
    Sequential,
    /// Source may run concurrently once no conflicts are outstanding.
    Parallel,
    /// The two items contend for the same resource.
    ResourceConflict,
    /// The two items touch conflicting configuration.
    ConfigurationConflict,
    /// Source depends on the dependency's test results.
    TestingDependency,
    /// Source depends on the dependency's validation results.
    ValidationDependency,
    /// Source depends on the dependency being deployed.
    DeploymentDependency,
}

/// Strength of a dependency relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum DependencyStrength {
    /// Advisory only.
    Weak,
    /// Default strength.
    #[default]
    Medium,
    /// Strongly coupled.
    Strong,
    /// Violations are never auto-resolved.
    Critical,
}

/// Status of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum DependencyStatus {
    /// Not yet satisfied.
    #[default]
    Pending,
    /// Readiness conditions met.
    Satisfied,
    /// The depended-on item failed.
    Failed,
    /// The depended-on item timed out.
    Timeout,
    /// Explicitly skipped.
    Skipped,
    /// Conflicts detected; resolution state records the attempt.
    Conflicted,
}

/// Strategy used to resolve a conflicted edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum ResolutionStrategy {
    /// Resolve by conflict severity.
    #[default]
    PriorityBased,
    /// Resolve by resource allocation.
    ResourceBased,
    /// Resolve by expected impact.
    ImpactBased,
    /// Force sequential execution.
    Sequential,
    /// Hand off to a human.
    Manual,
}

/// Severity of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    /// Cosmetic.
    Low,
    /// Bounded.
    Medium,
    /// Significant.
    High,
    /// Never auto-resolved.
    Critical,
}

/// One detected conflict on an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDescriptor {
    /// Conflict category (resource, configuration, testing, deployment).
    pub kind: String,
    /// Severity of the conflict.
    pub severity: ConflictSeverity,
    /// Human-readable detail.
    pub detail: String,
}

/// Conflict detection and resolution state of an edge.
///
/// Invariant: a `conflicted` edge always carries a non-null strategy attempt;
/// an edge is never silently discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConflictResolutionState {
    /// Whether conflicts were detected on the last check.
    pub has_conflict: bool,
    /// Strategy selected for resolution.
    pub strategy: Option<ResolutionStrategy>,
    /// Whether the conflicts were resolved.
    pub resolved: bool,
    /// Resolution label produced by the strategy.
    pub resolution: Option<String>,
    /// Conflicts found by the last detection pass.
    pub conflicts: Vec<ConflictDescriptor>,
}

/// A readiness condition listed on a prerequisite edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCondition {
    /// What must hold.
    pub description: String,
    /// Whether it currently holds.
    pub met: bool,
}

/// Directed dependency relation between two work items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Unique identifier.
    pub id: String,
    /// The dependent work item (gated by this edge).
    pub source_id: String,
    /// The work item being depended on.
    pub depends_on_id: String,
    /// Type of the relation.
    pub edge_type: DependencyType,
    /// Strength of the relation.
    pub strength: DependencyStrength,
    /// Current status.
    pub status: DependencyStatus,
    /// Conflict detection/resolution state.
    pub conflict: ConflictResolutionState,
    /// Readiness conditions (prerequisite edges).
    pub conditions: Vec<DependencyCondition>,
    /// Position in a sequential chain (1-based), for sequential edges.
    pub order: Option<u32>,
    /// When the edge became satisfied.
    pub satisfied_at: Option<DateTime<Utc>>,
    /// Timestamp when the edge was created.
    pub created_at: DateTime<Utc>,
}

impl DependencyEdge {
    /// Creates a new pending edge.
    #[must_use]
    pub fn new(
        id: String,
        source_id: String,
        depends_on_id: String,
        edge_type: DependencyType,
        strength: DependencyStrength,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source_id,
            depends_on_id,
            edge_type,
            strength,
            status: DependencyStatus::default(),
            conflict: ConflictResolutionState::default(),
            conditions: Vec::new(),
            order: None,
            satisfied_at: None,
            created_at: now,
        }
    }

    /// Creates an edge from a submission spec.
    #[must_use]
    pub fn from_spec(id: String, source_id: String, spec: &DependencySpec, now: DateTime<Utc>) -> Self {
        let mut edge =
            Self::new(id, source_id, spec.depends_on_id.clone(), spec.edge_type, spec.strength, now);
        edge.conditions = spec.conditions.clone();
        edge.order = spec.order;
        edge.conflict.strategy = spec.strategy;
        edge
    }

    /// Whether this edge gates its source from starting.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.status != DependencyStatus::Satisfied && self.status != DependencyStatus::Skipped
    }
}

/// Submission spec for a dependency edge, attached to a work-item spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    /// The work item being depended on.
    pub depends_on_id: String,
    /// Type of the relation.
    pub edge_type: DependencyType,
    /// Strength of the relation.
    #[serde(default)]
    pub strength: DependencyStrength,
    /// Readiness conditions.
    #[serde(default)]
    pub conditions: Vec<DependencyCondition>,
    /// Position in a sequential chain (1-based).
    #[serde(default)]
    pub order: Option<u32>,
    /// Conflict-resolution strategy to use if conflicts are detected.
    #[serde(default)]
    pub strategy: Option<ResolutionStrategy>,
}

impl DependencySpec {
    /// Creates a spec with default strength and no conditions.
    #[must_use]
    pub fn new(depends_on_id: String, edge_type: DependencyType) -> Self {
        Self {
            depends_on_id,
            edge_type,
            strength: DependencyStrength::default(),
            conditions: Vec::new(),
            order: None,
            strategy: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    #[test]
    fn test_new_edge_defaults() {
        let edge = DependencyEdge::new(
            "edge-1".to_string(),
            "task-2".to_string(),
            "task-1".to_string(),
            DependencyType::Prerequisite,
            DependencyStrength::Strong,
            now(),
        );
        assert_eq!(edge.status, DependencyStatus::Pending);
        assert!(!edge.conflict.has_conflict);
        assert!(edge.conflict.strategy.is_none());
        assert!(edge.is_blocking());
    }

    #[test]
    fn test_from_spec_carries_strategy_and_order() {
        let mut spec = DependencySpec::new("task-1".to_string(), DependencyType::Sequential);
        spec.order = Some(2);
        spec.strategy = Some(ResolutionStrategy::Manual);

        let edge = DependencyEdge::from_spec("edge-1".to_string(), "task-2".to_string(), &spec, now());
        assert_eq!(edge.order, Some(2));
        assert_eq!(edge.conflict.strategy, Some(ResolutionStrategy::Manual));
        assert_eq!(edge.depends_on_id, "task-1");
    }

    #[test]
    fn test_satisfied_edge_is_not_blocking() {
        let mut edge = DependencyEdge::new(
            "edge-1".to_string(),
            "task-2".to_string(),
            "task-1".to_string(),
            DependencyType::Prerequisite,
            DependencyStrength::Medium,
            now(),
        );
        edge.status = DependencyStatus::Satisfied;
        assert!(!edge.is_blocking());
        edge.status = DependencyStatus::Skipped;
        assert!(!edge.is_blocking());
        edge.status = DependencyStatus::Conflicted;
        assert!(edge.is_blocking());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ConflictSeverity::Critical > ConflictSeverity::High);
        assert!(ConflictSeverity::High > ConflictSeverity::Medium);
        assert!(ConflictSeverity::Medium > ConflictSeverity::Low);
    }

    #[test]
    fn test_edge_serde_round_trip() {
        let edge = DependencyEdge::new(
            "edge-1".to_string(),
            "task-2".to_string(),
            "task-1".to_string(),
            DependencyType::ResourceConflict,
            DependencyStrength::Critical,
            now(),
        );
        let json = serde_json::to_string(&edge).unwrap();
        let back: DependencyEdge = serde_json::from_str(&json).unwrap();
        assert_eq!(back, edge);
        assert!(json.contains("resource_conflict"));
    }
}
