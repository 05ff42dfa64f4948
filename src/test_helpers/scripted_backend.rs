use crate::config::EndpointConfig;
use crate::database::ConnectionBackend;
use crate::endpoint::{EndpointDescriptor, EndpointRegistry, EndpointRole};
use crate::error::{WarehouseError, WarehouseResult};
use crate::failover::ManagerSettings;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Handle produced by [`ScriptedBackend`]
#[derive(Debug)]
pub struct ScriptedHandle {
    id: u64,
    role: EndpointRole,
    closed: AtomicBool,
}

impl ScriptedHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Endpoint this handle was opened against
    pub fn role(&self) -> EndpointRole {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// In-memory backend with per-endpoint availability switches
#[derive(Debug)]
pub struct ScriptedBackend {
    primary_up: AtomicBool,
    backup_up: AtomicBool,
    probe_delay_ms: AtomicU64,
    next_handle_id: AtomicU64,
    handles_opened: AtomicU64,
    handles_closed: AtomicU64,
    endpoint_probes: AtomicU64,
    handle_probes: AtomicU64,
    open_probe_connections: AtomicI64,
}

impl ScriptedBackend {
    pub fn new(primary_up: bool, backup_up: bool) -> Self {
        Self {
            primary_up: AtomicBool::new(primary_up),
            backup_up: AtomicBool::new(backup_up),
            probe_delay_ms: AtomicU64::new(0),
            next_handle_id: AtomicU64::new(1),
            handles_opened: AtomicU64::new(0),
            handles_closed: AtomicU64::new(0),
            endpoint_probes: AtomicU64::new(0),
            handle_probes: AtomicU64::new(0),
            open_probe_connections: AtomicI64::new(0),
        }
    }

    pub fn set_up(&self, role: EndpointRole, up: bool) {
        self.flag(role).store(up, Ordering::Release);
    }

    pub fn is_up(&self, role: EndpointRole) -> bool {
        self.flag(role).load(Ordering::Acquire)
    }

    /// Delay every probe round trip, to exercise probe timeouts
    pub fn set_probe_delay(&self, delay: Duration) {
        self.probe_delay_ms
            .store(delay.as_millis() as u64, Ordering::Release);
    }

    pub fn handles_opened(&self) -> u64 {
        self.handles_opened.load(Ordering::Acquire)
    }

    /// Handles released through `close`
    pub fn handles_closed(&self) -> u64 {
        self.handles_closed.load(Ordering::Acquire)
    }

    pub fn endpoint_probes(&self) -> u64 {
        self.endpoint_probes.load(Ordering::Acquire)
    }

    pub fn handle_probes(&self) -> u64 {
        self.handle_probes.load(Ordering::Acquire)
    }

    /// Probe connections currently open; zero whenever no probe is running
    pub fn open_probe_connections(&self) -> i64 {
        self.open_probe_connections.load(Ordering::Acquire)
    }

    fn flag(&self, role: EndpointRole) -> &AtomicBool {
        match role {
            EndpointRole::Primary => &self.primary_up,
            EndpointRole::Backup => &self.backup_up,
        }
    }

    fn refused(role: EndpointRole) -> WarehouseError {
        WarehouseError::Database(format!("{role} endpoint refused connection"))
    }

    async fn round_trip_delay(&self) {
        let delay = self.probe_delay_ms.load(Ordering::Acquire);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

/// Decrements the open probe connection count when dropped, including when
/// the probe future is cancelled by a timeout.
struct ProbeConnection<'a> {
    open: &'a AtomicI64,
}

impl<'a> ProbeConnection<'a> {
    fn open(counter: &'a AtomicI64) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { open: counter }
    }
}

impl Drop for ProbeConnection<'_> {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl ConnectionBackend for ScriptedBackend {
    type Handle = ScriptedHandle;

    async fn open(&self, endpoint: &EndpointDescriptor) -> WarehouseResult<ScriptedHandle> {
        if !self.is_up(endpoint.role()) {
            return Err(Self::refused(endpoint.role()));
        }
        self.handles_opened.fetch_add(1, Ordering::AcqRel);
        Ok(ScriptedHandle {
            id: self.next_handle_id.fetch_add(1, Ordering::AcqRel),
            role: endpoint.role(),
            closed: AtomicBool::new(false),
        })
    }

    async fn ping_endpoint(&self, endpoint: &EndpointDescriptor) -> WarehouseResult<()> {
        self.endpoint_probes.fetch_add(1, Ordering::AcqRel);
        let _connection = ProbeConnection::open(&self.open_probe_connections);
        self.round_trip_delay().await;
        if self.is_up(endpoint.role()) {
            Ok(())
        } else {
            Err(Self::refused(endpoint.role()))
        }
    }

    async fn ping_handle(&self, handle: &ScriptedHandle) -> WarehouseResult<()> {
        self.handle_probes.fetch_add(1, Ordering::AcqRel);
        self.round_trip_delay().await;
        if handle.is_closed() {
            return Err(WarehouseError::Database("pool closed".to_string()));
        }
        if self.is_up(handle.role) {
            Ok(())
        } else {
            Err(Self::refused(handle.role))
        }
    }

    async fn close(&self, handle: &ScriptedHandle) {
        self.handles_closed.fetch_add(1, Ordering::AcqRel);
        handle.closed.store(true, Ordering::Release);
    }
}

/// Registry with distinct primary and backup descriptors
pub fn test_registry() -> EndpointRegistry {
    let endpoint = |host: &str| EndpointConfig {
        host: host.to_string(),
        database: "reports".to_string(),
        username: "reporter".to_string(),
        password: "reporter".to_string(),
        ..EndpointConfig::default()
    };
    EndpointRegistry::new(
        EndpointDescriptor::from_config(EndpointRole::Primary, &endpoint("warehouse-primary")),
        EndpointDescriptor::from_config(EndpointRole::Backup, &endpoint("warehouse-backup")),
    )
}

/// Short timeouts suitable for tests; probes on every call
pub fn test_settings() -> ManagerSettings {
    ManagerSettings {
        probe_timeout: Duration::from_millis(200),
        validation_ttl: Duration::ZERO,
        release_grace: Duration::ZERO,
    }
}
