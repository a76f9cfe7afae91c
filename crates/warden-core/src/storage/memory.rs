//! In-memory storage backend.

use crate::models::{AutonomousSystem, DependencyEdge, WorkItem};
use crate::storage::{EdgeStore, StorageError, StorageResult, SystemStore, WorkItemStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory store backed by `HashMap`s.
///
/// Every read returns a clone; callers never hold references into the maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    systems: Arc<RwLock<HashMap<String, AutonomousSystem>>>,
    work_items: Arc<RwLock<HashMap<String, WorkItem>>>,
    edges: Arc<RwLock<HashMap<String, DependencyEdge>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl SystemStore for MemoryStore {
    async fn insert_system(&self, system: AutonomousSystem) -> StorageResult<()> {
        let mut systems = self.systems.write().await;
        if systems.contains_key(&system.id) {
            return Err(StorageError::AlreadyExists(system.id));
        }
        systems.insert(system.id.clone(), system);
        Ok(())
    }

    async fn get_system(&self, id: &str) -> StorageResult<AutonomousSystem> {
        self.systems
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn update_system(&self, system: AutonomousSystem) -> StorageResult<()> {
        let mut systems = self.systems.write().await;
        if !systems.contains_key(&system.id) {
            return Err(StorageError::NotFound(system.id));
        }
        systems.insert(system.id.clone(), system);
        Ok(())
    }

    async fn delete_system(&self, id: &str) -> StorageResult<()> {
        self.systems
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_systems(&self) -> StorageResult<Vec<AutonomousSystem>> {
        let mut all: Vec<AutonomousSystem> = self.systems.read().await.values().cloned().collect();
        all.sort_by_key(|s| s.created_at);
        Ok(all)
    }
}

#[async_trait]
impl WorkItemStore for MemoryStore {
    async fn insert_work_item(&self, item: WorkItem) -> StorageResult<()> {
        let mut items = self.work_items.write().await;
        if items.contains_key(&item.id) {
            return Err(StorageError::AlreadyExists(item.id));
        }
        items.insert(item.id.clone(), item);
        Ok(())
    }

    async fn get_work_item(&self, id: &str) -> StorageResult<WorkItem> {
        self.work_items
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn update_work_item(&self, item: WorkItem) -> StorageResult<WorkItem> {
        let mut items = self.work_items.write().await;
        let current = items
            .get(&item.id)
            .ok_or_else(|| StorageError::NotFound(item.id.clone()))?;
        if current.version != item.version {
            return Err(StorageError::VersionConflict {
                id: item.id,
                expected: item.version,
                found: current.version,
            });
        }
        let mut stored = item;
        stored.version += 1;
        items.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete_work_item(&self, id: &str) -> StorageResult<()> {
        self.work_items
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_work_items(&self) -> StorageResult<Vec<WorkItem>> {
        let mut all: Vec<WorkItem> = self.work_items.read().await.values().cloned().collect();
        all.sort_by_key(|i| i.created_at);
        Ok(all)
    }

    async fn list_work_items_for_system(&self, system_id: &str) -> StorageResult<Vec<WorkItem>> {
        let mut owned: Vec<WorkItem> = self
            .work_items
            .read()
            .await
            .values()
            .filter(|i| i.system_id == system_id)
            .cloned()
            .collect();
        owned.sort_by_key(|i| i.created_at);
        Ok(owned)
    }
}

#[async_trait]
impl EdgeStore for MemoryStore {
    async fn insert_edge(&self, edge: DependencyEdge) -> StorageResult<()> {
        let mut edges = self.edges.write().await;
        if edges.contains_key(&edge.id) {
            return Err(StorageError::AlreadyExists(edge.id));
        }
        edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    async fn get_edge(&self, id: &str) -> StorageResult<DependencyEdge> {
        self.edges
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn update_edge(&self, edge: DependencyEdge) -> StorageResult<()> {
        let mut edges = self.edges.write().await;
        if !edges.contains_key(&edge.id) {
            return Err(StorageError::NotFound(edge.id));
        }
        edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    async fn list_edges(&self) -> StorageResult<Vec<DependencyEdge>> {
        let mut all: Vec<DependencyEdge> = self.edges.read().await.values().cloned().collect();
        all.sort_by_key(|e| e.created_at);
        Ok(all)
    }

    async fn edges_for_source(&self, source_id: &str) -> StorageResult<Vec<DependencyEdge>> {
        let mut found: Vec<DependencyEdge> = self
            .edges
            .read()
            .await
            .values()
            .filter(|e| e.source_id == source_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn edges_depending_on(&self, depends_on_id: &str) -> StorageResult<Vec<DependencyEdge>> {
        let mut found: Vec<DependencyEdge> = self
            .edges
            .read()
            .await
            .values()
            .filter(|e| e.depends_on_id == depends_on_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        Ok(found)
    }

    async fn delete_edges_touching(&self, item_id: &str) -> StorageResult<usize> {
        let mut edges = self.edges.write().await;
        let before = edges.len();
        edges.retain(|_, e| e.source_id != item_id && e.depends_on_id != item_id);
        Ok(before - edges.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DependencyType, Priority, SystemType, TaskItem, WorkItem, WorkItemPayload,
    };
    use chrono::{DateTime, Utc};

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    fn task(id: &str, system_id: &str) -> WorkItem {
        WorkItem::new(
            id.to_string(),
            system_id.to_string(),
            Priority::Normal,
            WorkItemPayload::Task(TaskItem::new(format!("task {id}"), 3)),
            now(),
        )
    }

    #[tokio::test]
    async fn test_system_crud() {
        let store = MemoryStore::new();
        let system = AutonomousSystem::new(
            "sys-1".to_string(),
            "compliance".to_string(),
            SystemType::ComplianceMonitor,
            now(),
        );
        store.insert_system(system.clone()).await.unwrap();

        let fetched = store.get_system("sys-1").await.unwrap();
        assert_eq!(fetched.name, "compliance");

        assert!(matches!(
            store.insert_system(system).await,
            Err(StorageError::AlreadyExists(_))
        ));

        store.delete_system("sys-1").await.unwrap();
        assert!(matches!(
            store.get_system("sys-1").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_work_item_version_check() {
        let store = MemoryStore::new();
        let item = task("task-1", "sys-1");
        store.insert_work_item(item.clone()).await.unwrap();

        // First writer wins and bumps the version.
        let updated = store.update_work_item(item.clone()).await.unwrap();
        assert_eq!(updated.version, 1);

        // Second writer still holds version 0 and must fail.
        let err = store.update_work_item(item).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::VersionConflict { expected: 0, found: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_list_work_items_ordered_by_creation() {
        let store = MemoryStore::new();
        let mut first = task("task-1", "sys-1");
        first.created_at = now();
        let mut second = task("task-2", "sys-1");
        second.created_at = now() + chrono::Duration::seconds(5);

        // Insert out of order.
        store.insert_work_item(second).await.unwrap();
        store.insert_work_item(first).await.unwrap();

        let all = store.list_work_items().await.unwrap();
        assert_eq!(all[0].id, "task-1");
        assert_eq!(all[1].id, "task-2");
    }

    #[tokio::test]
    async fn test_delete_edges_touching_both_directions() {
        let store = MemoryStore::new();
        let e1 = DependencyEdge::new(
            "edge-1".to_string(),
            "task-2".to_string(),
            "task-1".to_string(),
            DependencyType::Prerequisite,
            Default::default(),
            now(),
        );
        let e2 = DependencyEdge::new(
            "edge-2".to_string(),
            "task-1".to_string(),
            "task-3".to_string(),
            DependencyType::Sequential,
            Default::default(),
            now(),
        );
        let e3 = DependencyEdge::new(
            "edge-3".to_string(),
            "task-4".to_string(),
            "task-5".to_string(),
            DependencyType::Parallel,
            Default::default(),
            now(),
        );
        store.insert_edge(e1).await.unwrap();
        store.insert_edge(e2).await.unwrap();
        store.insert_edge(e3).await.unwrap();

        let removed = store.delete_edges_touching("task-1").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.list_edges().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edges_for_source_and_depending_on() {
        let store = MemoryStore::new();
        let edge = DependencyEdge::new(
            "edge-1".to_string(),
            "task-2".to_string(),
            "task-1".to_string(),
            DependencyType::Prerequisite,
            Default::default(),
            now(),
        );
        store.insert_edge(edge).await.unwrap();

        assert_eq!(store.edges_for_source("task-2").await.unwrap().len(), 1);
        assert_eq!(store.edges_for_source("task-1").await.unwrap().len(), 0);
        assert_eq!(store.edges_depending_on("task-1").await.unwrap().len(), 1);
    }
}
