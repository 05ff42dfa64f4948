//! # Connection Manager
//!
//! Owns the single active warehouse handle and the endpoint it came from.
//!
//! ## Concurrency
//!
//! The `(handle, source)` pair is one `Arc<ActiveConnection>` published
//! through an [`ArcSwap`], so readers load it without locking and can never
//! see a handle paired with the wrong source. Every replacement happens while
//! holding `guard`, so no two swaps interleave. Callers keep their own `Arc`,
//! which keeps a superseded handle alive until their query finishes.

use super::state::{ActiveConnection, ConnectionSnapshot, ConnectionState};
use crate::config::WarehouseConfig;
use crate::database::{ConnectionBackend, PgBackend};
use crate::endpoint::{EndpointDescriptor, EndpointRegistry, EndpointRole};
use crate::error::{WarehouseError, WarehouseResult};
use crate::health::HealthProber;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn, Instrument};

/// Timing knobs for the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Upper bound for each liveness probe
    pub probe_timeout: Duration,
    /// Reuse a successful validation for this long (zero probes on every call)
    pub validation_ttl: Duration,
    /// Keep a superseded handle referenced this long before dropping it
    pub release_grace: Duration,
}

impl ManagerSettings {
    pub fn from_config(config: &WarehouseConfig) -> Self {
        Self {
            probe_timeout: config.probe.timeout(),
            validation_ttl: config.probe.validation_ttl(),
            release_grace: config.recovery.release_grace(),
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&WarehouseConfig::default())
    }
}

#[derive(Debug, Default)]
struct FailoverCounters {
    failovers: AtomicU64,
    failbacks: AtomicU64,
    exhaustions: AtomicU64,
}

pub struct ConnectionManager<B: ConnectionBackend> {
    registry: EndpointRegistry,
    backend: Arc<B>,
    prober: HealthProber<B>,
    settings: ManagerSettings,
    active: ArcSwap<ActiveConnection<B::Handle>>,
    /// Serializes every replacement of `active`
    guard: Mutex<()>,
    closed: AtomicBool,
    counters: FailoverCounters,
}

impl<B: ConnectionBackend> std::fmt::Debug for ConnectionManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("active", &self.active.load_full())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ConnectionManager<PgBackend> {
    /// Build the registry and PostgreSQL backend from configuration and connect
    pub async fn connect(config: &WarehouseConfig) -> WarehouseResult<Arc<Self>> {
        let registry = EndpointRegistry::from_config(config)?;
        let backend = Arc::new(PgBackend::new(config.pool.clone()));
        Self::initialize(registry, backend, ManagerSettings::from_config(config)).await
    }
}

impl<B: ConnectionBackend> ConnectionManager<B> {
    /// Connect to the primary, or to the backup if the primary is unreachable.
    ///
    /// Fails with [`WarehouseError::FailoverExhausted`] when neither endpoint
    /// answers; the process must not start serving in that case.
    pub async fn initialize(
        registry: EndpointRegistry,
        backend: Arc<B>,
        settings: ManagerSettings,
    ) -> WarehouseResult<Arc<Self>> {
        info!(
            state = %ConnectionState::Initializing,
            primary = %registry.primary(),
            backup = %registry.backup(),
            probe_timeout_ms = settings.probe_timeout.as_millis() as u64,
            "Initializing warehouse connection manager"
        );

        let prober = HealthProber::new(Arc::clone(&backend), settings.probe_timeout);
        let active = match connect_in_priority_order(&registry, backend.as_ref(), &prober).await {
            Ok(active) => active,
            Err(e) => {
                error!(
                    state = %ConnectionState::Unavailable,
                    error = %e,
                    "No warehouse endpoint reachable at startup"
                );
                return Err(e);
            }
        };

        match active.source() {
            EndpointRole::Primary => info!(
                state = %active.state(),
                host = %active.host(),
                "Warehouse connection manager ready"
            ),
            EndpointRole::Backup => warn!(
                state = %active.state(),
                host = %active.host(),
                "Warehouse connection manager started on backup; primary unreachable"
            ),
        }

        Ok(Arc::new(Self {
            registry,
            backend,
            prober,
            settings,
            active: ArcSwap::from_pointee(active),
            guard: Mutex::new(()),
            closed: AtomicBool::new(false),
            counters: FailoverCounters::default(),
        }))
    }

    /// Return a live handle, reconnecting first if the current one is dead.
    ///
    /// Healthy handles are returned without touching the guard. When both
    /// endpoints are down this call fails with
    /// [`WarehouseError::FailoverExhausted`]; the next call tries again.
    pub async fn get_handle(&self) -> WarehouseResult<Arc<ActiveConnection<B::Handle>>> {
        self.ensure_open()?;

        let current = self.active.load_full();
        if self.validate(&current).await {
            return Ok(current);
        }

        warn!(
            source = %current.source(),
            host = %current.host(),
            "Active warehouse handle failed validation; reconnecting"
        );
        self.reconnect(&current).await
    }

    /// Swap back to the primary if still running on the backup.
    ///
    /// The primary handle is built before taking the guard so readers and
    /// reconnects are never blocked on connection setup. Returns `true` when
    /// the swap happened.
    pub async fn failback_to_primary(&self) -> WarehouseResult<bool> {
        self.ensure_open()?;
        if self.active_source() != EndpointRole::Backup {
            return Ok(false);
        }

        let primary = self.registry.primary();
        let handle = open_handle(self.backend.as_ref(), primary).await?;
        let replacement = Arc::new(ActiveConnection::new(primary, handle));

        let guard = self.guard.lock().await;
        if self.closed.load(Ordering::Acquire) || self.active_source() != EndpointRole::Backup {
            drop(guard);
            debug!("Failback skipped; manager already left the backup");
            self.backend.close(replacement.handle()).await;
            return Ok(false);
        }

        self.install(replacement);
        drop(guard);
        Ok(true)
    }

    /// Current state without probing
    pub fn state(&self) -> ConnectionState {
        self.active.load().state()
    }

    pub fn active_source(&self) -> EndpointRole {
        self.active.load().source()
    }

    /// Current pair without validating it
    pub fn current(&self) -> Arc<ActiveConnection<B::Handle>> {
        self.active.load_full()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let active = self.active.load_full();
        ConnectionSnapshot {
            state: active.state(),
            source: active.source(),
            host: active.host().to_string(),
            database: active.database().to_string(),
            connected_since: active.connected_since(),
            connected_for_ms: active.age().as_millis() as u64,
            failovers: self.counters.failovers.load(Ordering::Relaxed),
            failbacks: self.counters.failbacks.load(Ordering::Relaxed),
            exhaustions: self.counters.exhaustions.load(Ordering::Relaxed),
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn prober(&self) -> &HealthProber<B> {
        &self.prober
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release the active handle. Later `get_handle` calls fail with
    /// [`WarehouseError::ManagerClosed`].
    pub async fn shutdown(&self) {
        let _guard = self.guard.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let active = self.active.load_full();
        info!(
            source = %active.source(),
            host = %active.host(),
            "Shutting down warehouse connection manager"
        );
        self.backend.close(active.handle()).await;
    }

    fn ensure_open(&self) -> WarehouseResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WarehouseError::ManagerClosed);
        }
        Ok(())
    }

    async fn validate(&self, active: &ActiveConnection<B::Handle>) -> bool {
        if active.validated_within(self.settings.validation_ttl) {
            return true;
        }
        let alive = self
            .prober
            .probe_handle(active.source(), active.handle())
            .await;
        if alive {
            active.mark_validated();
        }
        alive
    }

    async fn reconnect(
        &self,
        stale: &Arc<ActiveConnection<B::Handle>>,
    ) -> WarehouseResult<Arc<ActiveConnection<B::Handle>>> {
        let _guard = self.guard.lock().await;
        self.ensure_open()?;

        // Another caller or the recovery monitor may have replaced it while we waited
        let latest = self.active.load_full();
        if !Arc::ptr_eq(&latest, stale) && self.validate(&latest).await {
            debug!(
                source = %latest.source(),
                "Warehouse handle already replaced by a concurrent reconnect"
            );
            return Ok(latest);
        }

        let replacement =
            match connect_in_priority_order(&self.registry, self.backend.as_ref(), &self.prober)
                .await
            {
                Ok(active) => Arc::new(active),
                Err(e) => {
                    self.counters.exhaustions.fetch_add(1, Ordering::Relaxed);
                    error!(
                        state = %ConnectionState::Unavailable,
                        error = %e,
                        "Warehouse reconnect failed"
                    );
                    return Err(e);
                }
            };

        self.install(Arc::clone(&replacement));
        Ok(replacement)
    }

    /// Publish `replacement`. Caller must hold `guard`.
    fn install(&self, replacement: Arc<ActiveConnection<B::Handle>>) {
        let to = replacement.source();
        let previous = self.active.swap(replacement);

        match (previous.source(), to) {
            (EndpointRole::Primary, EndpointRole::Backup) => {
                self.counters.failovers.fetch_add(1, Ordering::Relaxed);
                warn!(
                    from = %previous.host(),
                    state = %ConnectionState::OnBackup,
                    "Failed over to backup warehouse"
                );
            }
            (EndpointRole::Backup, EndpointRole::Primary) => {
                self.counters.failbacks.fetch_add(1, Ordering::Relaxed);
                info!(
                    from = %previous.host(),
                    state = %ConnectionState::OnPrimary,
                    "Failed back to primary warehouse"
                );
            }
            (source, _) => info!(
                source = %source,
                "Rebuilt warehouse handle on the same endpoint"
            ),
        }

        self.retire(previous);
    }

    fn retire(&self, previous: Arc<ActiveConnection<B::Handle>>) {
        let grace = self.settings.release_grace;
        if grace.is_zero() {
            drop(previous);
            return;
        }

        tokio::spawn(
            async move {
                tokio::time::sleep(grace).await;
                debug!(source = %previous.source(), "Releasing superseded warehouse handle");
                drop(previous);
            }
            .in_current_span(),
        );
    }
}

/// Probe and connect Primary then Backup, returning the first that works
async fn connect_in_priority_order<B: ConnectionBackend>(
    registry: &EndpointRegistry,
    backend: &B,
    prober: &HealthProber<B>,
) -> WarehouseResult<ActiveConnection<B::Handle>> {
    let mut failures = Vec::with_capacity(EndpointRole::PRIORITY.len());

    for role in EndpointRole::PRIORITY {
        let endpoint = registry.get(role);
        if let Some(probe_error) = prober.check_endpoint(endpoint).await.into_error() {
            failures.push(probe_error.to_string());
            continue;
        }

        match open_handle(backend, endpoint).await {
            Ok(handle) => {
                debug!(endpoint = %endpoint, "Built warehouse handle");
                return Ok(ActiveConnection::new(endpoint, handle));
            }
            Err(e) => {
                warn!(
                    role = %role,
                    error = %e,
                    "Endpoint answered probe but handle could not be built"
                );
                failures.push(e.to_string());
            }
        }
    }

    let mut failures = failures.into_iter();
    Err(WarehouseError::FailoverExhausted {
        primary: failures.next().unwrap_or_default(),
        backup: failures.next().unwrap_or_default(),
    })
}

async fn open_handle<B: ConnectionBackend>(
    backend: &B,
    endpoint: &EndpointDescriptor,
) -> WarehouseResult<B::Handle> {
    let limit = endpoint.connect_timeout();
    match tokio::time::timeout(limit, backend.open(endpoint)).await {
        Ok(result) => result,
        Err(_) => Err(WarehouseError::Timeout(format!(
            "building {} handle exceeded {}ms",
            endpoint.role(),
            limit.as_millis()
        ))),
    }
}
