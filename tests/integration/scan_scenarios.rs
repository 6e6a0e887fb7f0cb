//! End-to-end scan scenarios against mocked scheduler and node endpoints
//!
//! These tests verify that:
//! - A lagging node alerts once after the full attempt budget
//! - A node within threshold is checked exactly once
//! - A failing node alerts with the attempt count and error text
//! - Alerts are raised only for the processes that breach

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use slot_drift_monitor::{AlertReason, HttpSlotProber, RetryPolicy, ScanOrchestrator};
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn http_orchestrator(
    scheduler: &MockServer,
    max_retries: u32,
    threshold: u64,
) -> (ScanOrchestrator, Arc<RecordingSleeper>) {
    let prober = HttpSlotProber::new(scheduler.uri(), Duration::from_secs(5)).unwrap();
    let sleeper = Arc::new(RecordingSleeper::default());
    let orchestrator = ScanOrchestrator::new(
        Arc::new(prober),
        RetryPolicy::new(max_retries, threshold),
    )
    .with_sleeper(sleeper.clone());
    (orchestrator, sleeper)
}

async fn mount_node_slot(server: &MockServer, process_id: &str, slot: u64, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(node_path(process_id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(slot.to_string()))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_lagging_node_alerts_after_budget() {
    let scheduler = MockServer::start().await;
    let node = MockServer::start().await;
    mount_scheduler_slot(&scheduler, "proc-a", 100).await;
    mount_node_slot(&node, "proc-a", 80, 3).await;

    let (orchestrator, sleeper) = http_orchestrator(&scheduler, 3, 5);
    let registry = vec![create_process("proc-a", &[node.uri().as_str()])];

    let result = orchestrator.scan(&registry).await;

    assert_eq!(result.alerts.len(), 1);
    let alert = &result.alerts[0];
    assert!(alert.message.contains("20"));
    assert!(alert.message.contains("proc-a"));
    assert!(alert.message.contains(&node.uri()));
    assert_eq!(alert.node, node.uri());
    assert_matches!(alert.reason, AlertReason::Lagging { drift: 20, .. });
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn test_node_within_threshold_checked_once() {
    let scheduler = MockServer::start().await;
    let node = MockServer::start().await;
    mount_scheduler_slot(&scheduler, "proc-a", 100).await;
    mount_node_slot(&node, "proc-a", 97, 1).await;

    let (orchestrator, sleeper) = http_orchestrator(&scheduler, 3, 5);
    let registry = vec![create_process("proc-a", &[node.uri().as_str()])];

    let result = orchestrator.scan(&registry).await;

    assert!(result.alerts.is_empty());
    assert_eq!(result.pairs_evaluated, 1);
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_failing_node_alerts_with_attempt_count() {
    let scheduler = MockServer::start().await;
    let node = MockServer::start().await;
    mount_scheduler_slot(&scheduler, "proc-a", 100).await;
    Mock::given(method("GET"))
        .and(path(node_path("proc-a")))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&node)
        .await;

    let (orchestrator, _sleeper) = http_orchestrator(&scheduler, 3, 5);
    let registry = vec![create_process("proc-a", &[node.uri().as_str()])];

    let result = orchestrator.scan(&registry).await;

    assert_eq!(result.alerts.len(), 1);
    let alert = &result.alerts[0];
    assert!(
        alert.message.contains("failed after 3 attempts"),
        "unexpected message: {}",
        alert.message
    );
    assert!(alert.message.contains("500"));
    assert_matches!(alert.reason, AlertReason::Unreachable { attempts: 3, .. });
}

#[tokio::test]
async fn test_only_breaching_process_alerts() {
    let scheduler = MockServer::start().await;
    let node_a = MockServer::start().await;
    let node_b = MockServer::start().await;
    mount_scheduler_slot(&scheduler, "proc-a", 100).await;
    mount_scheduler_slot(&scheduler, "proc-b", 500).await;
    mount_node_slot(&node_a, "proc-a", 100, 1).await;
    mount_node_slot(&node_b, "proc-b", 400, 3).await;

    let (orchestrator, _sleeper) = http_orchestrator(&scheduler, 3, 5);
    let registry = vec![
        create_process("proc-a", &[node_a.uri().as_str()]),
        create_process("proc-b", &[node_b.uri().as_str()]),
    ];

    let result = orchestrator.scan(&registry).await;

    assert_eq!(result.alerts.len(), 1);
    assert_eq!(result.alerts[0].process_id, "proc-b");
    assert_eq!(result.alerts[0].node, node_b.uri());
    assert_eq!(result.pairs_evaluated, 2);
}

#[tokio::test]
async fn test_unreachable_scheduler_alerts_every_node() {
    // nothing is mounted on the scheduler, so every attempt answers 404
    let scheduler = MockServer::start().await;
    let registry = vec![create_process("proc-a", &["http://cu-1", "http://cu-2"])];

    let (orchestrator, _sleeper) = http_orchestrator(&scheduler, 2, 5);
    let result = orchestrator.scan(&registry).await;

    assert_eq!(result.alerts.len(), 2);
    for alert in &result.alerts {
        assert!(alert.message.contains("failed after 2 attempts"));
        assert!(alert.message.contains("404"));
    }
}

#[tokio::test]
async fn test_recovering_node_stops_at_first_success() {
    let prober = Arc::new(
        ScriptedProber::new()
            .scheduler("proc-a", Ok(1_000))
            .node("http://cu-1", vec![Ok(900), Ok(950), Ok(998)]),
    );
    let (orchestrator, sleeper) = orchestrator(prober.clone(), 5, 5);

    let result = orchestrator
        .scan(&[create_process("proc-a", &["http://cu-1"])])
        .await;

    assert!(result.alerts.is_empty());
    assert_eq!(prober.node_calls("http://cu-1"), 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn test_attempt_events_cover_every_pair() {
    let prober = Arc::new(
        ScriptedProber::new()
            .scheduler("proc-a", Ok(100))
            .node("http://cu-1", vec![Ok(100)])
            .node("http://cu-2", vec![Ok(0)]),
    );
    let (event_tx, mut event_rx) = broadcast::channel(64);
    let (orchestrator, _sleeper) = orchestrator(prober, 3, 5);

    let result = orchestrator
        .with_events(event_tx)
        .scan(&[create_process("proc-a", &["http://cu-1", "http://cu-2"])])
        .await;
    assert_eq!(result.alerts.len(), 1);

    let mut per_node = std::collections::HashMap::new();
    while let Ok(event) = event_rx.try_recv() {
        *per_node.entry(event.node).or_insert(0) += 1;
    }
    assert_eq!(per_node.get("http://cu-1"), Some(&1));
    assert_eq!(per_node.get("http://cu-2"), Some(&3));
}
