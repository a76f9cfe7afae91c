//! Autonomous system records.
//!
//! An [`AutonomousSystem`] is the owning aggregate for work items: it carries
//! a capability map seeded from its type, a derived automation percentage,
//! and a health score maintained by the health monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Category of autonomous system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemType {
    /// Watches compliance signals and raises findings.
    ComplianceMonitor,
    /// Predicts risk from incoming metrics.
    RiskPredictor,
    /// Detects and repairs faults automatically.
    AutoHealer,
    /// Renders decisions under uncertainty.
    DecisionEngine,
    /// Coordinates multi-step workflows.
    WorkflowOrchestrator,
    /// Catch-all for systems without seeded capabilities.
    Other,
}

impl SystemType {
    /// All recognized system types.
    pub const ALL: [Self; 6] = [
        Self::ComplianceMonitor,
        Self::RiskPredictor,
        Self::AutoHealer,
        Self::DecisionEngine,
        Self::WorkflowOrchestrator,
        Self::Other,
    ];

    /// Parses a snake_case type name.
    ///
    /// # Returns
    /// Returns `Some(SystemType)` for a recognized name, `None` otherwise.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "compliance_monitor" => Some(Self::ComplianceMonitor),
            "risk_predictor" => Some(Self::RiskPredictor),
            "auto_healer" => Some(Self::AutoHealer),
            "decision_engine" => Some(Self::DecisionEngine),
            "workflow_orchestrator" => Some(Self::WorkflowOrchestrator),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Returns the snake_case name of this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComplianceMonitor => "compliance_monitor",
            Self::RiskPredictor => "risk_predictor",
            Self::AutoHealer => "auto_healer",
            Self::DecisionEngine => "decision_engine",
            Self::WorkflowOrchestrator => "workflow_orchestrator",
            Self::Other => "other",
        }
    }

    /// Returns the default capability flags seeded for this type.
    ///
    /// Expressed as a lookup table rather than branching logic so each type's
    /// profile stays auditable in one place.
    #[must_use]
    pub fn default_capabilities(&self) -> BTreeMap<String, bool> {
        const PROFILES: [(&str, [bool; 6]); 6] = [
            // (type, [auto_detection, auto_resolution, predictive_analysis,
            //         self_learning, adaptive_response, continuous_optimization])
            ("compliance_monitor", [true, false, true, true, false, true]),
            ("risk_predictor", [true, false, true, true, true, false]),
            ("auto_healer", [true, true, false, true, true, false]),
            ("decision_engine", [false, true, true, true, false, true]),
            ("workflow_orchestrator", [true, true, false, false, true, true]),
            ("other", [false, false, false, false, false, false]),
        ];
        const FLAG_NAMES: [&str; 6] = [
            "auto_detection",
            "auto_resolution",
            "predictive_analysis",
            "self_learning",
            "adaptive_response",
            "continuous_optimization",
        ];

        let flags = PROFILES
            .iter()
            .find(|(name, _)| *name == self.as_str())
            .map(|(_, flags)| *flags)
            .unwrap_or([false; 6]);

        FLAG_NAMES
            .iter()
            .zip(flags)
            .map(|(name, enabled)| ((*name).to_string(), enabled))
            .collect()
    }
}

impl std::fmt::Display for SystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an autonomous system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum SystemStatus {
    /// System is being set up; health monitoring not yet scheduled.
    #[default]
    Initializing,
    /// System is fully autonomous.
    Active,
    /// System is supervised pending human review.
    Maintenance,
    /// System has been decommissioned.
    Retired,
}

impl SystemStatus {
    /// Checks if the system can transition to the given status.
    ///
    /// Maintenance returns to Active only through an explicit human-reviewed
    /// action; Retired is terminal.
    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            (Self::Initializing, Self::Active | Self::Retired) => true,
            (Self::Active, Self::Maintenance | Self::Retired) => true,
            (Self::Maintenance, Self::Active | Self::Retired) => true,
            (a, b) if *a == b => true,
            _ => false,
        }
    }

    /// Returns the snake_case label of this status, for logs/events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Maintenance => "maintenance",
            Self::Retired => "retired",
        }
    }
}

/// Rolling performance aggregates for a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerformanceMetrics {
    /// Number of tasks that reached `completed`.
    pub tasks_completed: u64,
    /// Number of tasks that reached `failed`.
    pub tasks_failed: u64,
    /// Number of decisions that reached `executed`.
    pub decisions_executed: u64,
    /// Mean task duration in milliseconds over completed tasks.
    pub avg_response_time_ms: f64,
    /// When the health monitor last sampled this system.
    pub last_health_check: Option<DateTime<Utc>>,
}

/// Health monitoring configuration for a single system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Whether periodic health checks are enabled.
    pub enabled: bool,
    /// Cadence of periodic health checks, in seconds.
    pub interval_secs: u64,
    /// Uptime percentage reported by an external signal source.
    pub uptime: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self { enabled: true, interval_secs: 60, uptime: 100.0 }
    }
}

/// Errors that can occur when working with system records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SystemError {
    /// Invalid system data.
    #[error("Invalid system: {0}")]
    InvalidSystem(String),
}

/// Core autonomous system record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomousSystem {
    /// Unique identifier for the system.
    pub id: String,
    /// Human-readable name for the system.
    pub name: String,
    /// Category of the system; determines seeded capabilities.
    pub system_type: SystemType,
    /// Current lifecycle status.
    pub status: SystemStatus,
    /// Named boolean capability flags.
    pub capabilities: BTreeMap<String, bool>,
    /// Derived: 100 x true flags / total flags, rounded.
    pub automation_percentage: u8,
    /// Weighted health score in [0, 100], maintained by the health monitor.
    pub health_score: u8,
    /// Rolling performance aggregates.
    pub performance: PerformanceMetrics,
    /// Health monitoring configuration.
    pub monitoring: MonitoringConfig,
    /// Timestamp when the system was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp when the system was last updated.
    pub updated_at: DateTime<Utc>,
}

impl AutonomousSystem {
    /// Creates a new system in `Initializing` status with capabilities seeded
    /// from its type.
    ///
    /// # Arguments
    /// * `id` - Unique identifier
    /// * `name` - Human-readable name
    /// * `system_type` - Category determining the seeded capability map
    /// * `now` - Creation timestamp (from the injected clock)
    #[must_use]
    pub fn new(id: String, name: String, system_type: SystemType, now: DateTime<Utc>) -> Self {
        let capabilities = system_type.default_capabilities();
        let automation_percentage = automation_percentage(&capabilities);
        Self {
            id,
            name,
            system_type,
            status: SystemStatus::Initializing,
            capabilities,
            automation_percentage,
            health_score: 100,
            performance: PerformanceMetrics::default(),
            monitoring: MonitoringConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Validates the system record.
    ///
    /// # Errors
    /// * `SystemError::InvalidSystem` - If id or name is empty.
    pub fn validate(&self) -> Result<(), SystemError> {
        if self.id.is_empty() {
            return Err(SystemError::InvalidSystem("id cannot be empty".to_string()));
        }
        if self.name.is_empty() {
            return Err(SystemError::InvalidSystem("name cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Merges a capability patch into the existing map and recomputes the
    /// automation percentage in the same mutation.
    ///
    /// Keys absent from the patch are never removed.
    ///
    /// # Arguments
    /// * `patch` - Capability flags to upsert
    /// * `now` - Update timestamp
    pub fn apply_capability_patch(&mut self, patch: &BTreeMap<String, bool>, now: DateTime<Utc>) {
        for (name, enabled) in patch {
            self.capabilities.insert(name.clone(), *enabled);
        }
        self.automation_percentage = automation_percentage(&self.capabilities);
        self.updated_at = now;
    }

    /// Records a freshly computed health score.
    ///
    /// # Arguments
    /// * `score` - Health score, already clamped to [0, 100]
    /// * `now` - Sample timestamp
    pub fn record_health_score(&mut self, score: u8, now: DateTime<Utc>) {
        self.health_score = score.min(100);
        self.performance.last_health_check = Some(now);
        self.updated_at = now;
    }
}

/// Computes the automation percentage for a capability map.
///
/// Returns `round(100 x true flags / total flags)`, or 0 for an empty map.
#[must_use]
pub fn automation_percentage(capabilities: &BTreeMap<String, bool>) -> u8 {
    if capabilities.is_empty() {
        return 0;
    }
    let enabled = capabilities.values().filter(|v| **v).count() as f64;
    let total = capabilities.len() as f64;
    (enabled / total * 100.0).round().clamp(0.0, 100.0) as u8
}
