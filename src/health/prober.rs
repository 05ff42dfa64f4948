//! # Health Prober
//!
//! Bounded-time liveness checks against an endpoint descriptor or an
//! existing handle. A probe never returns an error: failures and timeouts
//! are logged and reported as "dead".

use crate::database::ConnectionBackend;
use crate::endpoint::{EndpointDescriptor, EndpointRole};
use crate::error::WarehouseError;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub role: EndpointRole,
    pub alive: bool,
    pub latency_ms: u64,
    /// Why the probe failed; `None` when alive
    pub failure: Option<String>,
}

impl ProbeOutcome {
    /// The failure as a [`WarehouseError::ProbeFailure`], if the probe failed
    pub fn into_error(self) -> Option<WarehouseError> {
        self.failure.map(|reason| WarehouseError::ProbeFailure {
            role: self.role,
            reason,
        })
    }
}

pub struct HealthProber<B: ConnectionBackend> {
    backend: Arc<B>,
    timeout: Duration,
}

impl<B: ConnectionBackend> std::fmt::Debug for HealthProber<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProber")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<B: ConnectionBackend> HealthProber<B> {
    pub fn new(backend: Arc<B>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a dedicated connection to `endpoint` and run a trivial statement
    pub async fn check_endpoint(&self, endpoint: &EndpointDescriptor) -> ProbeOutcome {
        self.bounded(endpoint.role(), self.backend.ping_endpoint(endpoint))
            .await
    }

    /// Run a trivial statement through an existing handle
    pub async fn check_handle(&self, role: EndpointRole, handle: &B::Handle) -> ProbeOutcome {
        self.bounded(role, self.backend.ping_handle(handle)).await
    }

    pub async fn probe_endpoint(&self, endpoint: &EndpointDescriptor) -> bool {
        self.check_endpoint(endpoint).await.alive
    }

    pub async fn probe_handle(&self, role: EndpointRole, handle: &B::Handle) -> bool {
        self.check_handle(role, handle).await.alive
    }

    async fn bounded<F>(&self, role: EndpointRole, round_trip: F) -> ProbeOutcome
    where
        F: Future<Output = Result<(), WarehouseError>>,
    {
        let start = Instant::now();
        // On timeout the round trip future is dropped, which drops any connection it opened
        let result = tokio::time::timeout(self.timeout, round_trip).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("timed out after {}ms", self.timeout.as_millis())),
        };

        match &failure {
            None => debug!(role = %role, latency_ms = latency_ms, "Warehouse probe succeeded"),
            Some(reason) => warn!(
                role = %role,
                latency_ms = latency_ms,
                error = %reason,
                "Warehouse probe failed"
            ),
        }

        ProbeOutcome {
            role,
            alive: failure.is_none(),
            latency_ms,
            failure,
        }
    }
}
