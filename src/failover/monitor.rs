//! # Background Recovery Monitor
//!
//! Periodically re-probes the primary while the manager is running on the
//! backup, and swaps back once the primary answers.
//!
//! ## Recovery Flow
//!
//! 1. Timer tick (fixed interval, no backoff or jitter)
//! 2. Skip unless the manager is on the backup
//! 3. Probe the primary; on failure log and wait for the next tick
//! 4. Build a fresh primary handle and swap it in under the manager's guard
//!
//! The loop stops when [`RecoveryMonitorHandle::stop`] is called. A tick
//! already in progress is allowed to finish within the configured shutdown
//! timeout; after that the task is aborted.

use super::manager::ConnectionManager;
use crate::config::RecoveryConfig;
use crate::database::ConnectionBackend;
use crate::endpoint::EndpointRole;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// What a single recovery cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Already on the primary (or the manager is shut down)
    NotNeeded,
    /// On the backup and the primary is still unreachable
    PrimaryStillDown,
    /// Swapped back to the primary
    FailedBack,
}

/// Runtime statistics for the recovery monitor
#[derive(Debug, Default)]
pub struct RecoveryMonitorStats {
    pub ticks: AtomicU64,
    pub primary_probes: AtomicU64,
    pub failbacks: AtomicU64,
}

pub struct RecoveryMonitor<B: ConnectionBackend> {
    monitor_id: Uuid,
    manager: Arc<ConnectionManager<B>>,
    interval: Duration,
    shutdown_timeout: Duration,
    stats: Arc<RecoveryMonitorStats>,
}

impl<B: ConnectionBackend> std::fmt::Debug for RecoveryMonitor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryMonitor")
            .field("monitor_id", &self.monitor_id)
            .field("interval", &self.interval)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<B: ConnectionBackend> RecoveryMonitor<B> {
    pub fn new(manager: Arc<ConnectionManager<B>>, config: &RecoveryConfig) -> Self {
        Self::with_interval(manager, config.interval(), config.shutdown_timeout())
    }

    pub fn with_interval(
        manager: Arc<ConnectionManager<B>>,
        interval: Duration,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            monitor_id: Uuid::new_v4(),
            manager,
            interval,
            shutdown_timeout,
            stats: Arc::new(RecoveryMonitorStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<RecoveryMonitorStats> {
        Arc::clone(&self.stats)
    }

    /// Run one recovery cycle
    pub async fn tick(&self) -> RecoveryOutcome {
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        if self.manager.is_closed() || self.manager.active_source() != EndpointRole::Backup {
            return RecoveryOutcome::NotNeeded;
        }

        self.stats.primary_probes.fetch_add(1, Ordering::Relaxed);
        let primary = self.manager.registry().primary();
        if !self.manager.prober().probe_endpoint(primary).await {
            info!(
                monitor_id = %self.monitor_id,
                primary = %primary,
                "Primary warehouse still unreachable; staying on backup"
            );
            return RecoveryOutcome::PrimaryStillDown;
        }

        match self.manager.failback_to_primary().await {
            Ok(true) => {
                self.stats.failbacks.fetch_add(1, Ordering::Relaxed);
                RecoveryOutcome::FailedBack
            }
            Ok(false) => RecoveryOutcome::NotNeeded,
            Err(e) => {
                warn!(
                    monitor_id = %self.monitor_id,
                    error = %e,
                    "Primary answered probe but failback did not complete"
                );
                RecoveryOutcome::PrimaryStillDown
            }
        }
    }

    /// Spawn the recovery loop
    pub fn start(self) -> RecoveryMonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let monitor_id = self.monitor_id;
        let shutdown_timeout = self.shutdown_timeout;
        let stats = Arc::clone(&self.stats);

        info!(
            monitor_id = %monitor_id,
            interval_ms = self.interval.as_millis() as u64,
            "Starting warehouse recovery monitor"
        );

        let task = tokio::spawn(
            async move {
                let mut ticker = interval(self.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately; the first check runs one interval in
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            debug!(monitor_id = %self.monitor_id, "Recovery monitor received shutdown signal");
                            break;
                        }
                        _ = ticker.tick() => {
                            let outcome = self.tick().await;
                            debug!(monitor_id = %self.monitor_id, outcome = ?outcome, "Recovery cycle completed");
                        }
                    }
                }

                info!(monitor_id = %self.monitor_id, "Warehouse recovery monitor stopped");
            }
            .in_current_span(),
        );

        RecoveryMonitorHandle {
            monitor_id,
            shutdown_tx,
            task,
            shutdown_timeout,
            stats,
        }
    }
}

/// Controls a running [`RecoveryMonitor`]
#[derive(Debug)]
pub struct RecoveryMonitorHandle {
    monitor_id: Uuid,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
    shutdown_timeout: Duration,
    stats: Arc<RecoveryMonitorStats>,
}

impl RecoveryMonitorHandle {
    pub fn monitor_id(&self) -> Uuid {
        self.monitor_id
    }

    pub fn stats(&self) -> &RecoveryMonitorStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop to stop and wait for it, aborting after the shutdown timeout
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.shutdown_timeout, &mut self.task).await {
            Ok(_) => debug!(monitor_id = %self.monitor_id, "Recovery monitor joined"),
            Err(_) => {
                warn!(
                    monitor_id = %self.monitor_id,
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "Recovery monitor did not stop in time; aborting"
                );
                self.task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::ConnectionState;
    use crate::test_helpers::{test_registry, test_settings, ScriptedBackend};
    use std::time::Instant;

    async fn on_backup() -> (Arc<ScriptedBackend>, Arc<ConnectionManager<ScriptedBackend>>) {
        let backend = Arc::new(ScriptedBackend::new(false, true));
        let manager =
            ConnectionManager::initialize(test_registry(), Arc::clone(&backend), test_settings())
                .await
                .unwrap();
        (backend, manager)
    }

    #[tokio::test]
    async fn test_tick_is_noop_on_primary() {
        let backend = Arc::new(ScriptedBackend::new(true, true));
        let manager =
            ConnectionManager::initialize(test_registry(), Arc::clone(&backend), test_settings())
                .await
                .unwrap();
        let monitor = RecoveryMonitor::with_interval(
            manager,
            Duration::from_secs(60),
            Duration::from_secs(1),
        );
        let probes_before = backend.endpoint_probes();

        assert_eq!(monitor.tick().await, RecoveryOutcome::NotNeeded);
        assert_eq!(backend.endpoint_probes(), probes_before);
    }

    #[tokio::test]
    async fn test_tick_fails_back_once_primary_answers() {
        let (backend, manager) = on_backup().await;
        let monitor = RecoveryMonitor::with_interval(
            Arc::clone(&manager),
            Duration::from_secs(60),
            Duration::from_secs(1),
        );

        assert_eq!(monitor.tick().await, RecoveryOutcome::PrimaryStillDown);
        assert_eq!(manager.state(), ConnectionState::OnBackup);

        backend.set_up(EndpointRole::Primary, true);
        assert_eq!(monitor.tick().await, RecoveryOutcome::FailedBack);
        assert_eq!(manager.state(), ConnectionState::OnPrimary);
        assert_eq!(monitor.stats().failbacks.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_stop_returns_promptly() {
        let (_backend, manager) = on_backup().await;
        let handle = RecoveryMonitor::with_interval(
            manager,
            Duration::from_secs(3600),
            Duration::from_secs(1),
        )
        .start();
        assert!(handle.is_running());

        let started = Instant::now();
        handle.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
