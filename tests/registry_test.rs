//! Integration tests for SourceRegistry dispatch and health tracking

mod common;

use avspotter::registry::{HealthStatus, SourceRegistry};
use chrono::Utc;
use common::{create_test_item, PanickingCollector, ScriptedCollector};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_run_all_aggregates_successful_collectors() {
    let registry = SourceRegistry::new();
    registry.register(
        Arc::new(ScriptedCollector::ok(
            "reddit",
            vec![create_test_item("r1", &["a"]), create_test_item("r2", &["b"])],
        )),
        true,
        0,
    );
    registry.register(
        Arc::new(ScriptedCollector::ok("x", vec![create_test_item("x1", &["c"])])),
        true,
        1,
    );

    let items = registry.run_all(Utc::now(), 2).await;

    // Dispatch order: reddit (priority 0) then x
    let ids: Vec<_> = items.iter().map(|i| i.source_id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2", "x1"]);

    let health = registry.health("reddit").unwrap();
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.total_successes, 1);
    assert!(health.last_success.is_some());
}

#[tokio::test]
async fn test_failed_collector_contributes_nothing() {
    let registry = SourceRegistry::new();
    registry.register(
        Arc::new(ScriptedCollector::ok("reddit", vec![create_test_item("r1", &["a"])])),
        true,
        0,
    );
    registry.register(Arc::new(ScriptedCollector::failing("x")), true, 0);

    let items = registry.run_all(Utc::now(), 2).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source_id, "r1");

    let health = registry.health("x").unwrap();
    assert_eq!(health.consecutive_failures, 1);
    assert_eq!(health.status, HealthStatus::Healthy);
    assert!(health.last_error.unwrap().contains("status 1"));
}

#[tokio::test]
async fn test_all_collectors_failing_returns_empty() {
    let registry = SourceRegistry::new();
    registry.register(Arc::new(ScriptedCollector::failing("reddit")), true, 0);
    registry.register(Arc::new(ScriptedCollector::failing("x")), true, 0);

    let items = registry.run_all(Utc::now(), 2).await;
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_health_thresholds_and_reset() {
    let registry = SourceRegistry::new();
    let collector = Arc::new(ScriptedCollector::new(
        "reddit",
        vec![
            Err("timeout".into()),
            Err("timeout".into()),
            Err("timeout".into()),
            Err("timeout".into()),
            Ok(vec![create_test_item("r1", &["a"])]),
        ],
    ));
    registry.register(collector.clone(), true, 0);

    registry.run_all(Utc::now(), 1).await;
    assert_eq!(registry.health("reddit").unwrap().status, HealthStatus::Healthy);

    registry.run_all(Utc::now(), 1).await;
    assert_eq!(registry.health("reddit").unwrap().status, HealthStatus::Degraded);

    // Degraded collectors keep running
    registry.run_all(Utc::now(), 1).await;
    registry.run_all(Utc::now(), 1).await;
    let health = registry.health("reddit").unwrap();
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.consecutive_failures, 4);

    let items = registry.run_all(Utc::now(), 1).await;
    assert_eq!(items.len(), 1);
    let health = registry.health("reddit").unwrap();
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(collector.calls(), 5);
}

#[tokio::test]
async fn test_failed_collector_recovers_on_tenth_run() {
    let registry = SourceRegistry::new();
    let collector = Arc::new(ScriptedCollector::new(
        "x",
        vec![
            Err("blocked".into()),
            Err("blocked".into()),
            Err("blocked".into()),
            Err("blocked".into()),
            Err("blocked".into()),
            Ok(vec![create_test_item("x1", &["a"])]),
        ],
    ));
    registry.register(collector.clone(), true, 0);

    for _ in 0..5 {
        registry.run_all(Utc::now(), 1).await;
    }
    assert_eq!(registry.health("x").unwrap().status, HealthStatus::Failed);
    assert!(registry.eligible_collectors().is_empty());

    for _ in 6..10 {
        assert!(registry.run_all(Utc::now(), 1).await.is_empty());
    }
    assert_eq!(collector.calls(), 5);

    // Run 10 re-admits the failed collector, which now succeeds
    let items = registry.run_all(Utc::now(), 1).await;
    assert_eq!(registry.run_count(), 10);
    assert_eq!(items.len(), 1);
    assert_eq!(collector.calls(), 6);
    assert_eq!(registry.health("x").unwrap().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_disabled_collector_not_probed_on_recovery_run() {
    let registry = SourceRegistry::with_recovery_interval(2);
    let collector = Arc::new(ScriptedCollector::failing("x"));
    registry.register(collector.clone(), true, 0);

    for _ in 0..5 {
        registry.run_all(Utc::now(), 1).await;
    }
    // Runs 2 and 4 were recovery runs, but the collector was not yet failed
    assert_eq!(collector.calls(), 5);

    registry.set_enabled("x", false);
    registry.run_all(Utc::now(), 1).await;
    assert_eq!(collector.calls(), 5);

    // Toggling keeps the failed record
    assert_eq!(registry.health("x").unwrap().status, HealthStatus::Failed);
}

#[tokio::test]
async fn test_concurrency_bound() {
    let registry = SourceRegistry::new();
    for name in ["a", "b", "c", "d"] {
        registry.register(
            Arc::new(
                ScriptedCollector::ok(name, Vec::new()).with_delay(Duration::from_millis(150)),
            ),
            true,
            0,
        );
    }

    let started = Instant::now();
    registry.run_all(Utc::now(), 2).await;
    let bounded = started.elapsed();

    // Four 150ms collectors two at a time take at least two rounds
    assert!(bounded >= Duration::from_millis(300));

    let started = Instant::now();
    registry.run_all(Utc::now(), 4).await;
    assert!(started.elapsed() < bounded);
}

#[tokio::test]
async fn test_panicking_collector_counts_as_failure() {
    let registry = SourceRegistry::new();
    registry.register(Arc::new(PanickingCollector), true, 0);
    registry.register(
        Arc::new(ScriptedCollector::ok("reddit", vec![create_test_item("r1", &["a"])])),
        true,
        1,
    );

    let items = registry.run_all(Utc::now(), 2).await;
    assert_eq!(items.len(), 1);

    let health = registry.health("panicky").unwrap();
    assert_eq!(health.consecutive_failures, 1);
    assert!(health.last_error.unwrap().contains("aborted"));
}
