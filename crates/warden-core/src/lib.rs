//! Core types for the Warden orchestrator.
//!
//! This crate holds the shared vocabulary: the data model for autonomous
//! systems, work items, and dependency edges; the per-kind state machines;
//! the storage traits with the in-memory backend; the audit event bus; and
//! runtime configuration. Orchestration logic lives in `warden-orchestrator`.

pub mod clock;
pub mod config;
pub mod events;
pub mod machine;
pub mod models;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, DispatcherConfig, HealthConfig, RetryConfig, WardenConfig};
pub use events::{
    AuditEvent, AuditRecord, EscalationNotice, EscalationNotifier, EventBus, LoggingNotifier,
    RecordingNotifier, Severity,
};
pub use machine::{
    is_item_failed, is_item_settled, is_item_successful, transition, TransitionError,
    WorkItemState,
};
pub use storage::{
    EdgeStore, MemoryStore, StorageError, StorageResult, Store, SystemStore, WorkItemStore,
};
