//! Configuration Loader
//!
//! Layers built-in defaults, an optional TOML file, prefixed environment
//! variables, and the legacy flat `DB_*` variables into a validated
//! [`WarehouseConfig`].

use super::error::ConfigResult;
use super::WarehouseConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/warehouse.toml";

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "WAREHOUSE_CONFIG_PATH";

const ENV_PREFIX: &str = "WAREHOUSE";
const ENV_SEPARATOR: &str = "__";

/// Legacy flat variables and the configuration keys they override
const LEGACY_VARIABLES: &[(&str, &str)] = &[
    ("DB_HOST", "primary.host"),
    ("DB_PORT", "primary.port"),
    ("DB_NAME", "primary.database"),
    ("DB_USERNAME", "primary.username"),
    ("DB_PASS", "primary.password"),
    ("BACKUP_DB_HOST", "backup.host"),
    ("BACKUP_DB_PORT", "backup.port"),
    ("BACKUP_DB_NAME", "backup.database"),
    ("BACKUP_DB_USERNAME", "backup.username"),
    ("BACKUP_DB_PASS", "backup.password"),
];

/// Builder-style loader for [`WarehouseConfig`]
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_vars: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read this file instead of the default location. The file must exist.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use the given variables instead of the process environment
    pub fn with_env_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    /// Load, merge, and validate the configuration
    pub fn load(&self) -> ConfigResult<WarehouseConfig> {
        let vars = self
            .env_vars
            .clone()
            .unwrap_or_else(|| std::env::vars().collect());

        let (path, required) = self.resolve_config_path(&vars);
        debug!(
            path = %path.display(),
            required = required,
            "Loading warehouse configuration"
        );

        // No eager parsing: values stay strings until deserialized into
        // their typed fields, so a password like `00123` is kept verbatim
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .source(Some(
                vars.iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect::<config::Map<String, String>>(),
            ));

        let mut builder = Config::builder()
            .add_source(File::from(path.as_path()).required(required))
            .add_source(environment);

        for (variable, key) in LEGACY_VARIABLES {
            if let Some(value) = vars.get(*variable).filter(|v| !v.is_empty()) {
                debug!(variable = %variable, key = %key, "Applying legacy environment override");
                builder = builder.set_override_option(*key, Some(value.clone()))?;
            }
        }

        let config: WarehouseConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            primary = %config.primary.target(),
            backup = %config.backup.target(),
            probe_timeout_ms = config.probe.timeout_ms,
            recovery_interval_secs = config.recovery.interval_secs,
            "Warehouse configuration loaded"
        );
        debug!(config = %config.sanitized(), "Sanitized warehouse configuration");

        Ok(config)
    }

    fn resolve_config_path(&self, vars: &HashMap<String, String>) -> (PathBuf, bool) {
        if let Some(path) = &self.config_path {
            return (path.clone(), true);
        }
        match vars.get(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            Some(path) => (PathBuf::from(path), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        }
    }
}
