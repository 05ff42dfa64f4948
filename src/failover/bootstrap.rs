//! Startup wiring: configuration → manager → recovery monitor.

use super::manager::{ConnectionManager, ManagerSettings};
use super::monitor::{RecoveryMonitor, RecoveryMonitorHandle};
use crate::config::{RecoveryConfig, WarehouseConfig};
use crate::database::{ConnectionBackend, PgBackend};
use crate::endpoint::EndpointRegistry;
use crate::error::WarehouseResult;
use std::sync::Arc;
use tracing::info;

/// A running failover layer: the manager consumers query through, plus the
/// recovery monitor when enabled.
#[derive(Debug)]
pub struct FailoverSystem<B: ConnectionBackend> {
    manager: Arc<ConnectionManager<B>>,
    monitor: Option<RecoveryMonitorHandle>,
}

impl FailoverSystem<PgBackend> {
    /// Connect to the warehouse described by `config` and start recovery
    pub async fn bootstrap(config: &WarehouseConfig) -> WarehouseResult<Self> {
        let registry = EndpointRegistry::from_config(config)?;
        let backend = Arc::new(PgBackend::new(config.pool.clone()));
        Self::bootstrap_with_backend(
            registry,
            backend,
            ManagerSettings::from_config(config),
            &config.recovery,
        )
        .await
    }
}

impl<B: ConnectionBackend> FailoverSystem<B> {
    pub async fn bootstrap_with_backend(
        registry: EndpointRegistry,
        backend: Arc<B>,
        settings: ManagerSettings,
        recovery: &RecoveryConfig,
    ) -> WarehouseResult<Self> {
        let manager = ConnectionManager::initialize(registry, backend, settings).await?;

        let monitor = if recovery.enabled {
            Some(RecoveryMonitor::new(Arc::clone(&manager), recovery).start())
        } else {
            info!("Warehouse recovery monitor disabled by configuration");
            None
        };

        Ok(Self { manager, monitor })
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<B>> {
        &self.manager
    }

    pub fn monitor(&self) -> Option<&RecoveryMonitorHandle> {
        self.monitor.as_ref()
    }

    /// Stop the recovery monitor, then release the active handle
    pub async fn shutdown(self) {
        if let Some(monitor) = self.monitor {
            monitor.stop().await;
        }
        self.manager.shutdown().await;
    }
}
