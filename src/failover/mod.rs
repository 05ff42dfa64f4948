//! # Warehouse Failover
//!
//! Keeps a live handle to the data warehouse available to every query call
//! site, failing over from the primary to the backup when the primary stops
//! answering and failing back once it recovers.
//!
//! ## State Machine
//!
//! ```text
//! Initializing ──primary up──────────────▶ OnPrimary
//! Initializing ──primary down, backup up─▶ OnBackup
//! Initializing ──both down───────────────▶ Unavailable (fatal)
//! OnPrimary    ──validation fails, backup up──▶ OnBackup
//! OnBackup     ──recovery tick / reconnect finds primary──▶ OnPrimary
//! any          ──reconnect finds both down──▶ Unavailable (this call only)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use warehouse_failover::config::ConfigLoader;
//! use warehouse_failover::failover::FailoverSystem;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load()?;
//! let system = FailoverSystem::bootstrap(&config).await?;
//!
//! // Immediately before each query
//! let active = system.manager().get_handle().await?;
//! sqlx::query("SELECT 1").execute(active.handle()).await?;
//!
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod manager;
pub mod monitor;
pub mod state;

pub use bootstrap::FailoverSystem;
pub use manager::{ConnectionManager, ManagerSettings};
pub use monitor::{RecoveryMonitor, RecoveryMonitorHandle, RecoveryMonitorStats, RecoveryOutcome};
pub use state::{ActiveConnection, ConnectionSnapshot, ConnectionState};
