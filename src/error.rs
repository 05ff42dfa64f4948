//! Error types for the warehouse failover layer.
//!
//! Probe failures are recovered inside the crate and converted into
//! reconnect decisions. Only [`WarehouseError::FailoverExhausted`] and
//! configuration problems are meant to reach the query layer.

use crate::config::ConfigurationError;
use crate::endpoint::EndpointRole;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WarehouseError {
    #[error("Probe of {role} endpoint failed: {reason}")]
    ProbeFailure { role: EndpointRole, reason: String },

    #[error("Both warehouse endpoints are unreachable (primary: {primary}; backup: {backup})")]
    FailoverExhausted { primary: String, backup: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Connection manager has been shut down")]
    ManagerClosed,
}

impl WarehouseError {
    /// Whether the caller should surface this as a retryable
    /// service-unavailable condition rather than a hard failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FailoverExhausted { .. } | Self::ProbeFailure { .. } | Self::Timeout(_)
        )
    }

    pub fn is_failover_exhausted(&self) -> bool {
        matches!(self, Self::FailoverExhausted { .. })
    }
}

impl From<sqlx::Error> for WarehouseError {
    fn from(err: sqlx::Error) -> Self {
        WarehouseError::Database(err.to_string())
    }
}

pub type WarehouseResult<T> = std::result::Result<T, WarehouseError>;
