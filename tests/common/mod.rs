//! Shared setup for failover integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use warehouse_failover::test_helpers::{test_registry, test_settings, ScriptedBackend};
use warehouse_failover::{ConnectionManager, WarehouseResult};

pub type ScriptedManager = Arc<ConnectionManager<ScriptedBackend>>;

/// Backend with the given availability and a manager initialized against it
pub async fn start(
    primary_up: bool,
    backup_up: bool,
) -> (Arc<ScriptedBackend>, WarehouseResult<ScriptedManager>) {
    let backend = Arc::new(ScriptedBackend::new(primary_up, backup_up));
    let manager =
        ConnectionManager::initialize(test_registry(), Arc::clone(&backend), test_settings())
            .await;
    (backend, manager)
}

/// Poll `condition` until it holds or `deadline` passes
pub async fn eventually<F: Fn() -> bool>(deadline: Duration, condition: F) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
