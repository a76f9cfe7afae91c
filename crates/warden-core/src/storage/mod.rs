//! Storage traits and backends.
//!
//! Persistence is expressed as three async traits, one per aggregate, plus a
//! blanket [`Store`] trait combining them so components can hold a single
//! `Arc<dyn Store>`. The in-memory backend in [`memory`] is the default; a
//! durable backend only needs to implement the same traits.

pub mod error;
pub mod memory;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

use crate::models::{AutonomousSystem, DependencyEdge, WorkItem};
use async_trait::async_trait;

/// Persistence for autonomous system records.
#[async_trait]
pub trait SystemStore: Send + Sync {
    /// Inserts a new system.
    ///
    /// # Errors
    /// Returns `StorageError::AlreadyExists` if the id is taken.
    async fn insert_system(&self, system: AutonomousSystem) -> StorageResult<()>;

    /// Fetches a system by id.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the system does not exist.
    async fn get_system(&self, id: &str) -> StorageResult<AutonomousSystem>;

    /// Replaces a stored system.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the system does not exist.
    async fn update_system(&self, system: AutonomousSystem) -> StorageResult<()>;

    /// Removes a system.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the system does not exist.
    async fn delete_system(&self, id: &str) -> StorageResult<()>;

    /// Lists all systems, ordered by creation time.
    async fn list_systems(&self) -> StorageResult<Vec<AutonomousSystem>>;
}

/// Persistence for work items.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Inserts a new work item.
    ///
    /// # Errors
    /// Returns `StorageError::AlreadyExists` if the id is taken.
    async fn insert_work_item(&self, item: WorkItem) -> StorageResult<()>;

    /// Fetches a work item by id.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the item does not exist.
    async fn get_work_item(&self, id: &str) -> StorageResult<WorkItem>;

    /// Replaces a stored work item if its version matches.
    ///
    /// The stored copy must carry the same `version` as `item`; on success
    /// the version is bumped and the stored copy is returned. Lost updates
    /// surface as `VersionConflict` rather than silently overwriting.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the item does not exist, or
    /// `StorageError::VersionConflict` if it was modified since read.
    async fn update_work_item(&self, item: WorkItem) -> StorageResult<WorkItem>;

    /// Removes a work item.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the item does not exist.
    async fn delete_work_item(&self, id: &str) -> StorageResult<()>;

    /// Lists all work items, ordered by creation time.
    async fn list_work_items(&self) -> StorageResult<Vec<WorkItem>>;

    /// Lists work items owned by a system, ordered by creation time.
    async fn list_work_items_for_system(&self, system_id: &str) -> StorageResult<Vec<WorkItem>>;
}

/// Persistence for dependency edges.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Inserts a new edge.
    ///
    /// # Errors
    /// Returns `StorageError::AlreadyExists` if the id is taken.
    async fn insert_edge(&self, edge: DependencyEdge) -> StorageResult<()>;

    /// Fetches an edge by id.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the edge does not exist.
    async fn get_edge(&self, id: &str) -> StorageResult<DependencyEdge>;

    /// Replaces a stored edge.
    ///
    /// # Errors
    /// Returns `StorageError::NotFound` if the edge does not exist.
    async fn update_edge(&self, edge: DependencyEdge) -> StorageResult<()>;

    /// Lists all edges.
    async fn list_edges(&self) -> StorageResult<Vec<DependencyEdge>>;

    /// Lists edges whose source is the given work item.
    async fn edges_for_source(&self, source_id: &str) -> StorageResult<Vec<DependencyEdge>>;

    /// Lists edges that depend on the given work item.
    async fn edges_depending_on(&self, depends_on_id: &str) -> StorageResult<Vec<DependencyEdge>>;

    /// Removes every edge that touches the given work item, in either
    /// direction. Returns the number of edges removed.
    async fn delete_edges_touching(&self, item_id: &str) -> StorageResult<usize>;
}

/// Combined storage surface used by the orchestrator components.
pub trait Store: SystemStore + WorkItemStore + EdgeStore {}

impl<T: SystemStore + WorkItemStore + EdgeStore> Store for T {}
