//! Health scoring over real work-item history, and the escalation path
//! into maintenance and back.

use std::sync::Arc;
use warden_core::clock::ManualClock;
use warden_core::config::WardenConfig;
use warden_core::events::{RecordingNotifier, Severity};
use warden_core::models::{DecisionSpec, SystemStatus, SystemType, TaskSpec};
use warden_core::storage::MemoryStore;
use warden_orchestrator::{TriggerPayload, Warden};

struct Harness {
    warden: Warden,
    clock: Arc<ManualClock>,
    notifier: Arc<RecordingNotifier>,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::epoch());
    let notifier = Arc::new(RecordingNotifier::new());
    let warden = Warden::with_parts(
        WardenConfig::default(),
        Arc::new(MemoryStore::new()),
        clock.clone(),
        notifier.clone(),
    );
    Harness { warden, clock, notifier }
}

/// Runs one task to completion with the given wall-clock duration.
async fn complete_task(h: &Harness, system_id: &str, name: &str, duration_secs: i64) {
    let spec = TaskSpec { name: name.to_string(), ..TaskSpec::default() };
    let item = h.warden.submit_task(system_id, &spec).await.unwrap();
    h.warden.executor().try_queue(&item.id).await.unwrap();
    h.warden.executor().start(&item.id).await.unwrap();
    h.clock.advance(chrono::Duration::seconds(duration_secs));
    h.warden.executor().complete(&item.id, serde_json::Value::Null).await.unwrap();
}

/// Runs one task into terminal failure on its first attempt.
async fn fail_task(h: &Harness, system_id: &str, name: &str) {
    let spec = TaskSpec {
        name: name.to_string(),
        max_retries: Some(1),
        ..TaskSpec::default()
    };
    let item = h.warden.submit_task(system_id, &spec).await.unwrap();
    h.warden.executor().try_queue(&item.id).await.unwrap();
    h.warden.executor().start(&item.id).await.unwrap();
    h.warden.executor().fail(&item.id, "boom".to_string()).await.unwrap();
}

#[tokio::test]
async fn test_score_from_recorded_history() {
    let h = harness();
    let system = h.warden.create_system("scored", SystemType::WorkflowOrchestrator).await.unwrap();

    // 9 of 10 tasks succeed at a 2s response time, one fails outright.
    for i in 0..9 {
        complete_task(&h, &system.id, &format!("task-{i}"), 2).await;
    }
    fail_task(&h, &system.id, "task-9").await;

    // 4 of 5 decisions land at high confidence.
    for i in 0..4 {
        let spec = DecisionSpec {
            proposed_action: format!("tune-{i}"),
            confidence: 85,
            ..DecisionSpec::default()
        };
        h.warden.submit_decision(&system.id, &spec).await.unwrap();
    }
    let hesitant = DecisionSpec {
        proposed_action: "risky-tune".to_string(),
        confidence: 60,
        ..DecisionSpec::default()
    };
    h.warden.submit_decision(&system.id, &hesitant).await.unwrap();

    h.warden
        .submit_trigger(&system.id, TriggerPayload::UptimeSignal { uptime: 99.0 })
        .await
        .unwrap();

    // 0.9*30 + 0.8*25 + 0.8*20 + 0.9*15 + 9.9 rounds to 86.
    let report = h.warden.perform_health_check(&system.id).await.unwrap();
    assert_eq!(report.health_score, 86);
    assert_eq!(report.metrics.tasks_sampled, 10);
    assert_eq!(report.metrics.decisions_sampled, 5);
    assert!((report.metrics.avg_response_time_ms - 2000.0).abs() < f64::EPSILON);

    let system = h.warden.registry().get_system(&system.id).await.unwrap();
    assert_eq!(system.health_score, 86);
    assert_eq!(system.performance.tasks_completed, 9);
    assert_eq!(system.performance.tasks_failed, 1);
}

#[tokio::test]
async fn test_health_check_is_idempotent() {
    let h = harness();
    let system = h.warden.create_system("steady", SystemType::AutoHealer).await.unwrap();
    complete_task(&h, &system.id, "only", 1).await;

    let first = h.warden.perform_health_check(&system.id).await.unwrap();
    let second = h.warden.perform_health_check(&system.id).await.unwrap();
    assert_eq!(first.health_score, second.health_score);
    assert_eq!(first.metrics, second.metrics);
}

#[tokio::test]
async fn test_low_score_escalates_to_maintenance_once() {
    let h = harness();
    let system = h.warden.create_system("failing", SystemType::AutoHealer).await.unwrap();
    fail_task(&h, &system.id, "a").await;
    fail_task(&h, &system.id, "b").await;

    // All tasks failed: 0 + 0 + 20 + 0 + 10 = 30, below threshold.
    let report = h.warden.perform_health_check(&system.id).await.unwrap();
    assert_eq!(report.health_score, 30);

    let system_after = h.warden.registry().get_system(&system.id).await.unwrap();
    assert_eq!(system_after.status, SystemStatus::Maintenance);

    let notices = h.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].subject_id, system.id);
    assert_eq!(notices[0].reason, "health_threshold_exceeded");
    assert_eq!(notices[0].severity, Severity::Critical);

    // A system already in maintenance is not escalated again.
    h.warden.perform_health_check(&system.id).await.unwrap();
    assert_eq!(h.notifier.notices().len(), 1);
}

#[tokio::test]
async fn test_idle_system_is_not_escalated() {
    let h = harness();
    let system = h.warden.create_system("idle", SystemType::RiskPredictor).await.unwrap();

    // No history pulls the score below threshold, but with nothing sampled
    // the system stays in service.
    let report = h.warden.perform_health_check(&system.id).await.unwrap();
    assert_eq!(report.health_score, 45);
    assert_eq!(report.metrics.tasks_sampled, 0);

    let system = h.warden.registry().get_system(&system.id).await.unwrap();
    assert_eq!(system.status, SystemStatus::Active);
    assert!(h.notifier.notices().is_empty());
}

#[tokio::test]
async fn test_resume_clears_maintenance() {
    let h = harness();
    let system = h.warden.create_system("failing", SystemType::AutoHealer).await.unwrap();
    fail_task(&h, &system.id, "a").await;
    h.warden.perform_health_check(&system.id).await.unwrap();
    assert_eq!(
        h.warden.registry().get_system(&system.id).await.unwrap().status,
        SystemStatus::Maintenance
    );

    let resumed = h.warden.registry().resume_system(&system.id).await.unwrap();
    assert_eq!(resumed.status, SystemStatus::Active);
    assert_eq!(resumed.health_score, 100);
}
