//! Connection state and the published `(handle, source)` pair.

use crate::endpoint::{EndpointDescriptor, EndpointRole};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Where the manager currently sends queries.
///
/// `Initializing` only exists inside `ConnectionManager::initialize`, and
/// `Unavailable` is never stored: it is reported to the caller as
/// `FailoverExhausted` and the next call starts over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Initializing,
    OnPrimary,
    OnBackup,
    Unavailable,
}

impl From<EndpointRole> for ConnectionState {
    fn from(role: EndpointRole) -> Self {
        match role {
            EndpointRole::Primary => ConnectionState::OnPrimary,
            EndpointRole::Backup => ConnectionState::OnBackup,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Initializing => "initializing",
            ConnectionState::OnPrimary => "on_primary",
            ConnectionState::OnBackup => "on_backup",
            ConnectionState::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// An opened handle paired with the endpoint it was built from.
///
/// Never mutated after construction apart from the validation timestamp;
/// switching endpoints publishes a new `ActiveConnection`.
pub struct ActiveConnection<H> {
    source: EndpointRole,
    handle: H,
    host: String,
    database: String,
    established_at: Instant,
    connected_since: DateTime<Utc>,
    last_validated: Mutex<Option<Instant>>,
}

impl<H> ActiveConnection<H> {
    pub(crate) fn new(endpoint: &EndpointDescriptor, handle: H) -> Self {
        let now = Instant::now();
        Self {
            source: endpoint.role(),
            handle,
            host: endpoint.host().to_string(),
            database: endpoint.database().to_string(),
            established_at: now,
            connected_since: Utc::now(),
            // A handle is only built right after a successful probe
            last_validated: Mutex::new(Some(now)),
        }
    }

    pub fn source(&self) -> EndpointRole {
        self.source
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.source)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn connected_since(&self) -> DateTime<Utc> {
        self.connected_since
    }

    pub fn age(&self) -> Duration {
        self.established_at.elapsed()
    }

    /// Whether a successful validation happened within `ttl`
    pub(crate) fn validated_within(&self, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let last_validated = *self.last_validated.lock();
        last_validated.is_some_and(|at| at.elapsed() < ttl)
    }

    pub(crate) fn mark_validated(&self) {
        *self.last_validated.lock() = Some(Instant::now());
    }
}

impl<H> fmt::Debug for ActiveConnection<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveConnection")
            .field("source", &self.source)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("connected_since", &self.connected_since)
            .finish_non_exhaustive()
    }
}

/// Serializable view of the manager for health endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub source: EndpointRole,
    pub host: String,
    pub database: String,
    pub connected_since: DateTime<Utc>,
    pub connected_for_ms: u64,
    pub failovers: u64,
    pub failbacks: u64,
    pub exhaustions: u64,
}
