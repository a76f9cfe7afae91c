//! Data model for Warden.
//!
//! Defines the autonomous system aggregate, the work-item tagged union, and
//! directed dependency edges between work items.

pub mod dependency;
pub mod system;
pub mod work_item;

pub use dependency::{
    ConflictDescriptor, ConflictResolutionState, ConflictSeverity, DependencyCondition,
    DependencyEdge, DependencySpec, DependencyStatus, DependencyStrength, DependencyType,
    ResolutionStrategy,
};
pub use system::{
    automation_percentage, AutonomousSystem, MonitoringConfig, PerformanceMetrics, SystemError,
    SystemStatus, SystemType,
};
pub use work_item::{
    ComplianceCheck, DecisionItem, DecisionSpec, DecisionStatus, ExecutionStep, OptimizationItem,
    OptimizationStatus, OptimizationValidation, Priority, RiskLevel, RollbackRecord, TaskItem,
    TaskResult, TaskSpec, TaskStatus, ValidationOutcome, WorkItem, WorkItemKind, WorkItemPayload,
    WorkItemSpec,
};
