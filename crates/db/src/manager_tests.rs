//! Behavioural tests for `ConnectionManager`.
//!
//! All tests run against `MockConnector`, so no Postgres instance is needed.
//! Timing-sensitive tests use a paused tokio clock.

use std::time::Duration;

use crate::mock::{MockBehaviour, MockConnector};
use crate::{ConnectionError, ConnectionErrorKind, ConnectionManager, ConnectionState, DbConfig};

fn config() -> DbConfig {
    DbConfig::new(Some("postgres://app@localhost/app".into()))
}

fn manager(connector: &MockConnector) -> ConnectionManager<MockConnector> {
    ConnectionManager::new(config(), connector.clone())
}

fn manager_with_timeout(connector: &MockConnector, timeout: Duration) -> ConnectionManager<MockConnector> {
    ConnectionManager::new(config().with_connect_timeout(timeout), connector.clone())
}

/// Run `n` concurrent `ensure_connected` calls and collect their results.
async fn concurrent_calls(
    manager: &ConnectionManager<MockConnector>,
    n: usize,
) -> Vec<Result<(), ConnectionError>> {
    let handles: Vec<_> = (0..n)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_connected().await })
        })
        .collect();

    let mut results = Vec::with_capacity(n);
    for handle in handles {
        results.push(handle.await.expect("task panicked"));
    }
    results
}

// ============================================================
// Idempotence and single-flight
// ============================================================

#[tokio::test]
async fn live_connection_is_reused_without_new_attempts() {
    let connector = MockConnector::succeeding();
    let manager = manager(&connector);

    manager.ensure_connected().await.expect("first connect");
    assert_eq!(manager.state(), ConnectionState::Live);

    let started = std::time::Instant::now();
    for _ in 0..100 {
        manager.ensure_connected().await.expect("reuse");
    }
    assert!(started.elapsed() < Duration::from_millis(50));
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(manager.attempts_started(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_attempt() {
    let connector = MockConnector::succeeding_after(Duration::from_millis(50));
    let manager = manager(&connector);

    let results = concurrent_calls(&manager, 16).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Live);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_receive_the_same_failure() {
    let connector = MockConnector::refusing_after(Duration::from_millis(20), "ECONNREFUSED 127.0.0.1:1");
    let manager = manager(&connector);

    let results = concurrent_calls(&manager, 3).await;

    let messages: Vec<String> = results
        .iter()
        .map(|r| {
            let err = r.as_ref().expect_err("attempt should fail");
            assert_eq!(err.kind(), ConnectionErrorKind::Refused);
            err.to_string()
        })
        .collect();
    assert!(messages.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(messages[0], "connection refused: ECONNREFUSED 127.0.0.1:1");
    assert_eq!(connector.attempt_count(), 1);
    assert_eq!(manager.state(), ConnectionState::Failed);
}

// ============================================================
// Failure modes
// ============================================================

#[tokio::test]
async fn missing_url_fails_fast_without_an_attempt() {
    let connector = MockConnector::hanging();
    let manager = ConnectionManager::new(DbConfig::new(None), connector.clone());

    let started = std::time::Instant::now();
    let err = manager.ensure_connected().await.unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(5));
    assert!(matches!(err, ConnectionError::ConfigMissing("DATABASE_URL")));
    assert_eq!(connector.attempt_count(), 0);
    assert_eq!(manager.attempts_started(), 0);
    assert_eq!(manager.state(), ConnectionState::Failed);
    assert_eq!(
        manager.last_error().map(|e| e.kind()),
        Some(ConnectionErrorKind::ConfigMissing)
    );
}

#[tokio::test(start_paused = true)]
async fn hanging_connect_times_out_within_budget() {
    let connector = MockConnector::hanging();
    let manager = manager_with_timeout(&connector, Duration::from_millis(100));

    let started = tokio::time::Instant::now();
    let err = manager.ensure_connected().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ConnectionError::Timeout(budget) if budget == Duration::from_millis(100)));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(150));
    assert_eq!(manager.state(), ConnectionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn unreachable_target_gives_every_request_the_same_timeout() {
    let connector = MockConnector::hanging();
    let manager = manager_with_timeout(&connector, Duration::from_millis(100));

    let started = tokio::time::Instant::now();
    let results = concurrent_calls(&manager, 3).await;

    assert!(started.elapsed() < Duration::from_millis(150));
    for result in &results {
        assert_eq!(result.as_ref().unwrap_err().kind(), ConnectionErrorKind::Timeout);
    }
    assert_eq!(connector.attempt_count(), 1);
}

#[tokio::test]
async fn panicking_connector_is_reported_as_refused() {
    let connector = MockConnector::new(MockBehaviour::Panic);
    let manager = manager(&connector);

    let err = manager.ensure_connected().await.unwrap_err();
    assert_eq!(err.kind(), ConnectionErrorKind::Refused);
    assert_eq!(manager.state(), ConnectionState::Failed);

    connector.set_behaviour(MockBehaviour::Succeed(Duration::ZERO));
    manager.ensure_connected().await.expect("recovers after panic");
    assert_eq!(manager.state(), ConnectionState::Live);
}

// ============================================================
// Recovery and decay
// ============================================================

#[tokio::test(start_paused = true)]
async fn failed_state_recovers_on_next_call() {
    let connector = MockConnector::refusing_after(Duration::from_millis(10), "server selection failed");
    let manager = manager(&connector);

    assert!(manager.ensure_connected().await.is_err());
    assert_eq!(manager.state(), ConnectionState::Failed);

    connector.set_behaviour(MockBehaviour::Succeed(Duration::from_millis(10)));
    manager.ensure_connected().await.expect("second attempt succeeds");

    assert_eq!(manager.state(), ConnectionState::Live);
    assert!(manager.last_error().is_none());
    assert_eq!(connector.attempt_count(), 2);
}

#[tokio::test]
async fn dropped_connection_is_replaced() {
    let connector = MockConnector::succeeding();
    let manager = manager(&connector);
    manager.ensure_connected().await.unwrap();

    let first = connector.issued()[0].clone();
    first.kill();
    assert!(!manager.probe_liveness());

    manager.ensure_connected().await.expect("reconnects after decay");
    assert_eq!(connector.attempt_count(), 2);
    assert!(manager.probe_liveness());

    let current = manager.connection().await.unwrap();
    assert_eq!(current.serial, 2);

    // The dead connection is released on a background task.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(first.release_count(), 1);
}

#[tokio::test]
async fn panicking_liveness_check_triggers_reconnect() {
    let connector = MockConnector::succeeding();
    let manager = manager(&connector);
    manager.ensure_connected().await.unwrap();

    connector.issued()[0].poison();
    assert!(!manager.probe_liveness());

    manager.ensure_connected().await.expect("reconnects after panicking probe");
    assert_eq!(connector.attempt_count(), 2);
    assert_eq!(manager.connection().await.unwrap().serial, 2);
}

#[test]
fn attempt_lost_with_its_runtime_is_retried() {
    let connector = MockConnector::hanging();
    let manager = manager(&connector);

    let first = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let gave_up = first.block_on(async {
        tokio::time::timeout(Duration::from_millis(20), manager.ensure_connected()).await
    });
    assert!(gave_up.is_err());
    assert_eq!(manager.state(), ConnectionState::Connecting);
    drop(first);

    connector.set_behaviour(MockBehaviour::Succeed(Duration::ZERO));
    let second = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    second.block_on(async {
        for _ in 0..3 {
            manager.ensure_connected().await.expect("reconnects on the new runtime");
        }
    });

    assert_eq!(manager.state(), ConnectionState::Live);
    assert_eq!(connector.attempt_count(), 2);
    assert_eq!(manager.attempts_started(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelled_caller_does_not_cancel_the_attempt() {
    let connector = MockConnector::succeeding_after(Duration::from_millis(50));
    let manager = manager(&connector);

    let caller = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.ensure_connected().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.state(), ConnectionState::Connecting);
    caller.abort();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.state(), ConnectionState::Live);
    assert_eq!(connector.attempt_count(), 1);
}

// ============================================================
// Connection access and shutdown
// ============================================================

#[tokio::test]
async fn connection_connects_on_demand() {
    let connector = MockConnector::succeeding();
    let manager = manager(&connector);

    let conn = manager.connection().await.expect("connection");
    assert_eq!(conn.serial, 1);
    assert!(manager.status().live);
}

#[tokio::test]
async fn close_releases_and_allows_reconnect() {
    let connector = MockConnector::succeeding();
    let manager = manager(&connector);
    manager.ensure_connected().await.unwrap();

    manager.close().await;
    manager.close().await;

    assert_eq!(manager.state(), ConnectionState::Unconnected);
    assert_eq!(connector.issued()[0].release_count(), 1);

    manager.ensure_connected().await.unwrap();
    assert_eq!(connector.attempt_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn close_during_attempt_fails_waiters_and_releases_late_connection() {
    let connector = MockConnector::succeeding_after(Duration::from_millis(50));
    let manager = manager(&connector);

    let caller = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.ensure_connected().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    manager.close().await;

    let err = caller.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ConnectionErrorKind::Refused);
    assert_eq!(err.to_string(), "connection refused: connection closed during attempt");
    assert!(!manager.probe_liveness());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.state(), ConnectionState::Unconnected);
    assert_eq!(connector.issued()[0].release_count(), 1);
}

#[tokio::test]
async fn status_reports_last_failure() {
    let connector = MockConnector::refusing_after(Duration::ZERO, "auth failed");
    let manager = manager(&connector);
    let _ = manager.ensure_connected().await;

    let status = manager.status();
    assert_eq!(status.state, ConnectionState::Failed);
    assert!(!status.live);
    assert_eq!(status.error_kind, Some(ConnectionErrorKind::Refused));
    assert_eq!(status.last_error.as_deref(), Some("connection refused: auth failed"));
    assert_eq!(status.attempts, 1);
    assert!(status.connected_since.is_none());
}
