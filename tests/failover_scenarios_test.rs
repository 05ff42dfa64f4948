//! Startup and on-demand failover behavior of the connection manager

mod common;

use common::start;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use warehouse_failover::{ConnectionState, EndpointRole, WarehouseError};

#[tokio::test]
async fn test_initialize_transition_table() {
    let cases = [
        (true, true, Some(ConnectionState::OnPrimary)),
        (true, false, Some(ConnectionState::OnPrimary)),
        (false, true, Some(ConnectionState::OnBackup)),
        (false, false, None),
    ];

    for (primary_up, backup_up, expected) in cases {
        let (_backend, result) = start(primary_up, backup_up).await;
        match expected {
            Some(state) => {
                let manager = result.unwrap_or_else(|e| {
                    panic!("primary_up={primary_up} backup_up={backup_up}: {e}")
                });
                assert_eq!(manager.state(), state);
            }
            None => assert!(matches!(
                result,
                Err(WarehouseError::FailoverExhausted { .. })
            )),
        }
    }
}

#[tokio::test]
async fn test_scenario_a_primary_reachable_at_boot() {
    let (backend, manager) = start(true, true).await;
    let manager = manager.unwrap();

    assert_eq!(manager.state(), ConnectionState::OnPrimary);
    let active = manager.get_handle().await.unwrap();
    assert_eq!(active.source(), EndpointRole::Primary);
    assert_eq!(active.handle().role(), EndpointRole::Primary);
    // The backup is never touched while the primary answers
    assert_eq!(backend.handles_opened(), 1);
}

#[tokio::test]
async fn test_scenario_b_backup_when_primary_down_at_boot() {
    let (_backend, manager) = start(false, true).await;
    let manager = manager.unwrap();

    assert_eq!(manager.state(), ConnectionState::OnBackup);
    let active = manager.get_handle().await.unwrap();
    assert_eq!(active.source(), EndpointRole::Backup);
    assert_eq!(active.handle().role(), EndpointRole::Backup);
}

#[tokio::test]
async fn test_scenario_d_both_down_at_boot_is_fatal() {
    let (backend, manager) = start(false, false).await;

    let err = manager.unwrap_err();
    assert!(err.is_failover_exhausted());
    let message = err.to_string();
    assert!(message.contains("Probe of primary endpoint failed"));
    assert!(message.contains("Probe of backup endpoint failed"));
    assert_eq!(backend.handles_opened(), 0);
    assert_eq!(backend.open_probe_connections(), 0);
}

#[tokio::test]
async fn test_primary_failure_fails_over_on_next_call() {
    let (backend, manager) = start(true, true).await;
    let manager = manager.unwrap();

    backend.set_up(EndpointRole::Primary, false);
    let active = manager.get_handle().await.unwrap();

    assert_eq!(active.source(), EndpointRole::Backup);
    assert_eq!(manager.state(), ConnectionState::OnBackup);
}

#[tokio::test]
async fn test_on_demand_reconnect_prefers_primary() {
    let (backend, manager) = start(false, true).await;
    let manager = manager.unwrap();

    // Backup dies after the primary came back: the reconnect lands on primary
    backend.set_up(EndpointRole::Primary, true);
    backend.set_up(EndpointRole::Backup, false);

    let active = manager.get_handle().await.unwrap();
    assert_eq!(active.source(), EndpointRole::Primary);
    assert_eq!(manager.snapshot().failbacks, 1);
}

#[tokio::test]
async fn test_exhaustion_is_per_call_and_recoverable() {
    let (backend, manager) = start(true, true).await;
    let manager = manager.unwrap();

    backend.set_up(EndpointRole::Primary, false);
    backend.set_up(EndpointRole::Backup, false);

    let err = tokio::time::timeout(Duration::from_secs(5), manager.get_handle())
        .await
        .expect("get_handle must not deadlock")
        .unwrap_err();
    assert!(err.is_failover_exhausted());
    assert!(err.is_retryable());

    // Still failing, still not stuck
    assert!(manager.get_handle().await.is_err());
    assert_eq!(manager.snapshot().exhaustions, 2);

    backend.set_up(EndpointRole::Backup, true);
    let active = manager.get_handle().await.unwrap();
    assert_eq!(active.source(), EndpointRole::Backup);
}

#[tokio::test]
async fn test_slow_probes_are_bounded_and_release_connections() {
    let (backend, manager) = start(true, true).await;
    let manager = manager.unwrap();

    // Probes now exceed the 200ms probe timeout on every endpoint
    backend.set_probe_delay(Duration::from_millis(400));
    let result = tokio::time::timeout(Duration::from_secs(3), manager.get_handle())
        .await
        .expect("probes are bounded by their timeout");

    assert!(result.unwrap_err().is_failover_exhausted());
    assert_eq!(backend.open_probe_connections(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_see_mismatched_pair() {
    let (backend, manager) = start(true, true).await;
    let manager = manager.unwrap();

    let flipper = {
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            for round in 0..20 {
                backend.set_up(EndpointRole::Primary, round % 2 == 1);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            backend.set_up(EndpointRole::Primary, true);
        })
    };

    let callers = (0..32).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..20 {
                let active = manager.get_handle().await.expect("backup always up");
                seen.push((active.source(), active.handle().role()));
                tokio::task::yield_now().await;
            }
            seen
        })
    });

    let results = join_all(callers).await;
    flipper.await.unwrap();

    for result in results {
        for (source, handle_role) in result.unwrap() {
            assert_eq!(source, handle_role);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failover_builds_one_replacement() {
    let (backend, manager) = start(true, true).await;
    let manager = manager.unwrap();
    backend.set_up(EndpointRole::Primary, false);

    let callers = (0..16).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.get_handle().await })
    });

    for result in join_all(callers).await {
        assert_eq!(result.unwrap().unwrap().source(), EndpointRole::Backup);
    }
    // The initial primary handle plus a single backup handle
    assert_eq!(backend.handles_opened(), 2);
    assert_eq!(manager.snapshot().failovers, 1);
}
