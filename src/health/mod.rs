//! # Health Monitoring
//!
//! Liveness probes used by the connection manager on every handle
//! validation and by the recovery monitor when checking the primary.

pub mod prober;

pub use prober::{HealthProber, ProbeOutcome};
