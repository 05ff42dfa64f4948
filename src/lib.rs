#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Warehouse Failover
//!
//! Connectivity resilience layer for a reporting backend's data warehouse.
//!
//! ## Overview
//!
//! Query call sites ask a [`ConnectionManager`] for a live handle right
//! before each query. The manager validates the current handle with a
//! bounded probe, and when it is dead reconnects in priority order: the
//! primary first, then the backup. A background [`RecoveryMonitor`] swaps
//! back to the primary once it answers again. Call sites never change.
//!
//! ## Module Organization
//!
//! - [`config`] - Layered endpoint, probe, pool, and recovery configuration
//! - [`endpoint`] - Immutable primary/backup descriptors
//! - [`database`] - Backend seam and the SQLx PostgreSQL backend
//! - [`health`] - Bounded-time liveness probes
//! - [`failover`] - Connection manager, recovery monitor, startup wiring
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//! - `test_helpers` - Scripted in-memory backend for tests (`test-helpers` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use warehouse_failover::{ConfigLoader, ConnectionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load()?;
//! let manager = ConnectionManager::connect(&config).await?;
//!
//! let active = manager.get_handle().await?;
//! println!("querying {} ({})", active.host(), active.source());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod endpoint;
pub mod error;
pub mod failover;
pub mod health;
pub mod logging;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{ConfigLoader, ConfigurationError, WarehouseConfig};
pub use database::{ConnectionBackend, PgBackend};
pub use endpoint::{Credentials, EndpointDescriptor, EndpointRegistry, EndpointRole};
pub use error::{WarehouseError, WarehouseResult};
pub use failover::{
    ActiveConnection, ConnectionManager, ConnectionSnapshot, ConnectionState, FailoverSystem,
    ManagerSettings, RecoveryMonitor, RecoveryMonitorHandle, RecoveryOutcome,
};
pub use health::{HealthProber, ProbeOutcome};
