//! Breaker bookkeeping through the resource manager and executor

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use verity_resources::{
    AdaptiveResourceManager, Admission, AdmissionError, AlertConfig, BreakerConfig, BreakerState,
    ExecutionError, ExecutionOutcome, ManagerConfig, ResourceAlertManager, ResourceAwareExecutor,
    WorkContext,
};

use crate::common::{Flaky, probe};

const EXECUTOR: &str = "score.coherence";

fn manager(failure_threshold: u32, base_timeout_secs: f64) -> Arc<AdaptiveResourceManager> {
    let config = ManagerConfig {
        base_timeout_secs,
        breaker: BreakerConfig {
            failure_threshold,
            cooldown_secs: 3600.0,
            ..BreakerConfig::default()
        },
        ..ManagerConfig::default()
    };
    Arc::new(AdaptiveResourceManager::new(
        config,
        probe(0.1),
        ResourceAlertManager::new(AlertConfig::default()),
    ))
}

fn failure() -> ExecutionOutcome {
    ExecutionOutcome {
        success: false,
        duration: Duration::from_millis(5),
        memory_mb: 1.0,
    }
}

fn breaker_counts(manager: &AdaptiveResourceManager) -> (u32, u64) {
    let status = manager.status();
    let breaker = status.executors[EXECUTOR]
        .breaker
        .clone()
        .expect("breaker exists after a failure");
    (breaker.failure_count, breaker.total_changes)
}

#[test]
fn threshold_opens_once_and_later_failures_only_count() {
    let manager = manager(3, 300.0);

    for _ in 0..3 {
        manager.start_execution(EXECUTOR).unwrap();
        manager.end_execution(EXECUTOR, failure());
    }
    assert_eq!(manager.breaker_state(EXECUTOR), BreakerState::Open);
    assert_eq!(breaker_counts(&manager), (3, 1));

    for _ in 0..50 {
        manager.end_execution(EXECUTOR, failure());
    }
    assert_eq!(breaker_counts(&manager), (53, 1));

    let Admission::Denied(AdmissionError::CircuitOpen { failures, .. }) =
        manager.can_execute(EXECUTOR)
    else {
        panic!("open breaker must deny admission");
    };
    assert_eq!(failures, 53);
    assert!(manager.start_execution(EXECUTOR).is_err());

    assert!(manager.reset_breaker(EXECUTOR));
    assert_eq!(breaker_counts(&manager), (0, 2));
    assert!(manager.can_execute(EXECUTOR).is_allowed());
}

#[test]
fn concurrent_failures_are_all_recorded() {
    let manager = manager(3, 300.0);

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..25 {
                    manager.end_execution(EXECUTOR, failure());
                }
            });
        }
    });

    assert_eq!(breaker_counts(&manager), (200, 1));
    let status = manager.status();
    let metrics = &status.executors[EXECUTOR].metrics;
    assert_eq!(metrics.failures, 200);
    assert_eq!(metrics.total, 200);
}

#[tokio::test]
async fn executor_failures_trip_the_breaker() {
    let manager = manager(2, 300.0);
    let executor = ResourceAwareExecutor::new(Arc::clone(&manager));
    let unit = Flaky {
        id: EXECUTOR,
        delay: Duration::ZERO,
        fail: true,
    };
    let ctx = WorkContext::new(Value::Null);

    for _ in 0..2 {
        let err = executor.execute(&unit, &ctx).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Failed { .. }));
    }
    let err = executor.execute(&unit, &ctx).await.unwrap_err();
    assert!(err.is_denied());
    assert_eq!(err.executor_id(), EXECUTOR);
    assert_eq!(breaker_counts(&manager), (2, 1));
    assert_eq!(manager.status().executors[EXECUTOR].active, 0);
}

#[tokio::test]
async fn deadline_is_a_recorded_failure() {
    let manager = manager(5, 0.02);
    let executor = ResourceAwareExecutor::new(Arc::clone(&manager));
    let unit = Flaky {
        id: EXECUTOR,
        delay: Duration::from_secs(5),
        fail: false,
    };

    let err = executor
        .execute(&unit, &WorkContext::new(Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::DeadlineExceeded { ref executor_id, .. } if executor_id == EXECUTOR
    ));
    assert_eq!(breaker_counts(&manager), (1, 0));
    assert_eq!(manager.status().executors[EXECUTOR].active, 0);
}
