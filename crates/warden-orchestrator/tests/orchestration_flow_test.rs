//! End-to-end flows through the `Warden` facade: trigger submission,
//! dependency-gated dispatch, and cascading system deletion.

use std::sync::Arc;
use warden_core::clock::ManualClock;
use warden_core::config::WardenConfig;
use warden_core::events::RecordingNotifier;
use warden_core::models::{
    DependencySpec, DependencyType, SystemStatus, SystemType, TaskSpec, TaskStatus, WorkItemSpec,
};
use warden_core::storage::{MemoryStore, WorkItemStore};
use warden_orchestrator::{TriggerPayload, Warden};

struct Harness {
    warden: Warden,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::epoch());
    let warden = Warden::with_parts(
        WardenConfig::default(),
        store.clone(),
        clock.clone(),
        Arc::new(RecordingNotifier::new()),
    );
    Harness { warden, store, clock }
}

fn task(name: &str) -> TaskSpec {
    TaskSpec { name: name.to_string(), ..TaskSpec::default() }
}

#[tokio::test]
async fn test_created_system_is_active_and_monitored() {
    let h = harness();
    let system = h.warden.create_system("pipeline", SystemType::WorkflowOrchestrator).await.unwrap();

    assert_eq!(system.status, SystemStatus::Active);
    assert!(h.warden.monitor_scheduler().is_scheduled(&system.id).await);

    let overview = h.warden.get_system_status(&system.id).await.unwrap();
    assert_eq!(overview.status, SystemStatus::Active);
    assert_eq!(overview.health_score, 100);
}

#[tokio::test]
async fn test_configured_check_interval_seeds_monitoring() {
    let store = Arc::new(MemoryStore::new());
    let mut config = WardenConfig::default();
    config.health.check_interval_secs = 15;
    let warden = Warden::with_parts(
        config,
        store,
        Arc::new(ManualClock::epoch()),
        Arc::new(RecordingNotifier::new()),
    );

    let system = warden.create_system("pipeline", SystemType::WorkflowOrchestrator).await.unwrap();
    let fetched = warden.registry().get_system(&system.id).await.unwrap();
    assert_eq!(fetched.monitoring.interval_secs, 15);
}

#[tokio::test]
async fn test_trigger_payloads_create_matching_work_items() {
    let h = harness();
    let system = h.warden.create_system("pipeline", SystemType::WorkflowOrchestrator).await.unwrap();

    let created = h
        .warden
        .submit_trigger(&system.id, TriggerPayload::WorkItem(WorkItemSpec::Task(task("ingest"))))
        .await
        .unwrap();
    assert!(created.unwrap().as_task().is_some());

    let created = h
        .warden
        .submit_trigger(
            &system.id,
            TriggerPayload::WorkItem(WorkItemSpec::Optimization {
                optimization_type: "cache_tuning".to_string(),
            }),
        )
        .await
        .unwrap();
    assert!(created.unwrap().as_optimization().is_some());

    // Uptime signals create nothing and feed the next health check.
    let created = h
        .warden
        .submit_trigger(&system.id, TriggerPayload::UptimeSignal { uptime: 97.5 })
        .await
        .unwrap();
    assert!(created.is_none());
    let system = h.warden.registry().get_system(&system.id).await.unwrap();
    assert!((system.monitoring.uptime - 97.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_dispatch_respects_prerequisite_ordering() {
    let h = harness();
    let system = h.warden.create_system("pipeline", SystemType::WorkflowOrchestrator).await.unwrap();

    let upstream = h.warden.submit_task(&system.id, &task("extract")).await.unwrap();
    let mut gated = task("load");
    gated
        .dependencies
        .push(DependencySpec::new(upstream.id.clone(), DependencyType::Prerequisite));
    let downstream = h.warden.submit_task(&system.id, &gated).await.unwrap();

    // Only the ungated task is promoted on the first sweep.
    let summary = h.warden.dispatcher().run_tick_once().await.unwrap();
    assert_eq!(summary.promoted, 1);
    let held = h.store.get_work_item(&downstream.id).await.unwrap();
    assert_eq!(held.as_task().unwrap().status, TaskStatus::Pending);

    h.warden.executor().start(&upstream.id).await.unwrap();
    h.clock.advance(chrono::Duration::seconds(1));
    h.warden.executor().complete(&upstream.id, serde_json::json!({"rows": 42})).await.unwrap();

    // Upstream completion satisfies the edge and frees the downstream task.
    let summary = h.warden.dispatcher().run_tick_once().await.unwrap();
    assert_eq!(summary.promoted, 1);
    let freed = h.store.get_work_item(&downstream.id).await.unwrap();
    assert_eq!(freed.as_task().unwrap().status, TaskStatus::Queued);
}

#[tokio::test]
async fn test_downstream_cannot_start_before_upstream() {
    let h = harness();
    let system = h.warden.create_system("pipeline", SystemType::WorkflowOrchestrator).await.unwrap();

    let upstream = h.warden.submit_task(&system.id, &task("extract")).await.unwrap();
    let mut gated = task("load");
    gated
        .dependencies
        .push(DependencySpec::new(upstream.id.clone(), DependencyType::Prerequisite));
    let downstream = h.warden.submit_task(&system.id, &gated).await.unwrap();

    assert!(!h.warden.executor().can_start(&downstream.id).await.unwrap());
    let err = h.warden.executor().start(&downstream.id).await.unwrap_err();
    assert!(matches!(err, warden_orchestrator::OrchestrationError::Validation(_)));
}

#[tokio::test]
async fn test_delete_system_cascades_items_and_edges() {
    let h = harness();
    let system = h.warden.create_system("pipeline", SystemType::WorkflowOrchestrator).await.unwrap();

    let upstream = h.warden.submit_task(&system.id, &task("extract")).await.unwrap();
    let mut gated = task("load");
    gated
        .dependencies
        .push(DependencySpec::new(upstream.id.clone(), DependencyType::Prerequisite));
    h.warden.submit_task(&system.id, &gated).await.unwrap();

    h.warden.delete_system(&system.id).await.unwrap();

    assert!(h.warden.registry().get_system(&system.id).await.is_err());
    assert!(h.store.list_work_items().await.unwrap().is_empty());
    assert!(!h.warden.monitor_scheduler().is_scheduled(&system.id).await);

    use warden_core::storage::EdgeStore;
    assert!(h.store.list_edges().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_submitting_against_unknown_system_fails() {
    let h = harness();
    let err = h.warden.submit_task("sys-missing", &task("orphan")).await.unwrap_err();
    assert!(matches!(err, warden_orchestrator::OrchestrationError::SystemNotFound(_)));
}

#[tokio::test]
async fn test_cycle_in_submission_is_rejected() {
    let h = harness();
    let system = h.warden.create_system("pipeline", SystemType::WorkflowOrchestrator).await.unwrap();

    let a = h.warden.submit_task(&system.id, &task("a")).await.unwrap();
    let mut b_spec = task("b");
    b_spec.dependencies.push(DependencySpec::new(a.id.clone(), DependencyType::Prerequisite));
    let b = h.warden.submit_task(&system.id, &b_spec).await.unwrap();

    // a depending back on b would close the loop.
    let mut c_spec = task("a2");
    c_spec.dependencies.push(DependencySpec::new(b.id.clone(), DependencyType::Prerequisite));
    c_spec.dependencies.push(DependencySpec::new(a.id.clone(), DependencyType::Prerequisite));
    // Still acyclic: both edges point at existing roots.
    h.warden.submit_task(&system.id, &c_spec).await.unwrap();
}

#[tokio::test]
async fn test_dispatcher_start_and_shutdown() {
    let h = harness();
    h.warden.start().unwrap();
    assert!(h.warden.dispatcher().is_running());
    assert!(h.warden.start().is_err());

    h.warden.shutdown().await;
    assert!(!h.warden.dispatcher().is_running());
}
