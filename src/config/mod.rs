//! # Warehouse Connection Configuration
//!
//! Typed configuration for the two warehouse endpoints and for the probe,
//! pool, and recovery settings of the failover layer.
//!
//! ## Sources
//!
//! Values are layered by [`ConfigLoader`] (later sources win):
//!
//! 1. Built-in defaults
//! 2. An optional TOML file (`config/warehouse.toml` or `WAREHOUSE_CONFIG_PATH`)
//! 3. `WAREHOUSE__SECTION__KEY` environment variables
//! 4. Legacy flat variables (`DB_HOST`, `DB_PORT`, ... and `BACKUP_DB_*`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use warehouse_failover::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().load()?;
//! println!("primary host: {}", config.primary.host);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration structure mirroring `warehouse.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WarehouseConfig {
    /// Preferred warehouse instance
    #[serde(default)]
    pub primary: EndpointConfig,

    /// Fallback instance used while the primary is unreachable
    #[serde(default)]
    pub backup: EndpointConfig,

    /// Pool sizing applied to every handle built for either endpoint
    #[serde(default)]
    pub pool: PoolConfig,

    /// Liveness probe settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Background failback loop settings
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

/// Connection settings for a single warehouse endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Accept the server certificate without verification
    #[serde(default = "default_trust_server_certificate")]
    pub trust_server_certificate: bool,
    #[serde(default = "default_application_name")]
    pub application_name: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Driver startup options passed through to the server
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            database: String::new(),
            username: String::new(),
            password: String::new(),
            trust_server_certificate: default_trust_server_certificate(),
            application_name: default_application_name(),
            connect_timeout_ms: default_connect_timeout_ms(),
            options: BTreeMap::new(),
        }
    }
}

impl EndpointConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `host:port/database`, used to detect duplicated endpoints and in logs
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }

    fn validate(&self, context: &str) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("host", context));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("database", context));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field("username", context));
        }
        if self.port == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("{context}.port"),
                "0",
                "port must be between 1 and 65535",
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                format!("{context}.connect_timeout_ms"),
                "0",
                "connect timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Connection pool sizing for warehouse handles
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: 0,
            acquire_timeout_ms: default_acquire_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

/// Liveness probe settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Upper bound for a single probe round trip
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
    /// Skip re-probing a handle validated within this window (0 = probe every call)
    #[serde(default)]
    pub validation_ttl_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout_ms(),
            validation_ttl_ms: 0,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validation_ttl(&self) -> Duration {
        Duration::from_millis(self.validation_ttl_ms)
    }
}

/// Background recovery monitor settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_recovery_enabled")]
    pub enabled: bool,
    #[serde(default = "default_recovery_interval_secs")]
    pub interval_secs: u64,
    /// How long `stop()` waits for the loop before aborting it
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Delay before a superseded handle is released
    #[serde(default)]
    pub release_grace_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_recovery_enabled(),
            interval_secs: default_recovery_interval_secs(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            release_grace_ms: 0,
        }
    }
}

impl RecoveryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn release_grace(&self) -> Duration {
        Duration::from_millis(self.release_grace_ms)
    }
}

impl WarehouseConfig {
    /// Validate the loaded configuration
    pub fn validate(&self) -> ConfigResult<()> {
        self.primary.validate("primary")?;
        self.backup.validate("backup")?;

        if self.primary.target() == self.backup.target() {
            return Err(ConfigurationError::DuplicateEndpoints {
                target: self.primary.target(),
            });
        }

        if self.pool.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "pool.max_connections",
                "0",
                "pool must allow at least one connection",
            ));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigurationError::invalid_value(
                "pool.min_connections",
                self.pool.min_connections.to_string(),
                format!(
                    "must not exceed pool.max_connections ({})",
                    self.pool.max_connections
                ),
            ));
        }
        if self.probe.timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "probe.timeout_ms",
                "0",
                "probe timeout must be greater than zero",
            ));
        }
        if self.recovery.interval_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "recovery.interval_secs",
                "0",
                "recovery interval must be greater than zero",
            ));
        }

        Ok(())
    }

    /// JSON view of the configuration with credentials masked, safe for logs
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self);
        sanitize_json_recursive(&mut value, &["password", "secret", "token", "credential"]);
        value
    }
}

fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let is_sensitive = sensitive_patterns
                    .iter()
                    .any(|pattern| key_lower.contains(pattern));

                if is_sensitive {
                    *val = match val {
                        serde_json::Value::String(s) if s.is_empty() => {
                            serde_json::Value::String("[EMPTY]".to_string())
                        }
                        _ => serde_json::Value::String("[MASKED]".to_string()),
                    };
                } else {
                    sanitize_json_recursive(val, sensitive_patterns);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                sanitize_json_recursive(item, sensitive_patterns);
            }
        }
        _ => {}
    }
}

fn default_port() -> u16 {
    5432
}

fn default_trust_server_certificate() -> bool {
    true
}

fn default_application_name() -> String {
    "warehouse-failover".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_max_lifetime_secs() -> u64 {
    1_800
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

fn default_recovery_enabled() -> bool {
    true
}

fn default_recovery_interval_secs() -> u64 {
    30
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}
