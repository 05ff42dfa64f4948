//! Layered configuration loading and validation

use proptest::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use warehouse_failover::{ConfigLoader, ConfigurationError, EndpointRegistry, EndpointRole};

const SAMPLE_CONFIG: &str = r#"
[primary]
host = "warehouse-a.internal"
port = 5433
database = "reports"
username = "reporter"
password = "primary-secret"
trust_server_certificate = false

[primary.options]
statement_timeout = "30000"

[backup]
host = "warehouse-b.internal"
database = "reports"
username = "reporter"
password = ""

[probe]
timeout_ms = 1500

[recovery]
interval_secs = 15
"#;

fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("warehouse.toml");
    fs::write(&path, contents).unwrap();
    (temp_dir, path)
}

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_file_values_and_defaults() {
    let (_dir, path) = write_config(SAMPLE_CONFIG);
    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env_vars(HashMap::new())
        .load()
        .unwrap();

    assert_eq!(config.primary.port, 5433);
    assert!(!config.primary.trust_server_certificate);
    assert_eq!(
        config.primary.options.get("statement_timeout").map(String::as_str),
        Some("30000")
    );
    assert_eq!(config.backup.port, 5432);
    assert!(config.backup.trust_server_certificate);
    assert_eq!(config.probe.timeout_ms, 1500);
    assert_eq!(config.recovery.interval_secs, 15);
    assert!(config.recovery.enabled);
    assert_eq!(config.pool.max_connections, 10);
}

#[test]
fn test_environment_overrides_file() {
    let (_dir, path) = write_config(SAMPLE_CONFIG);
    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env_vars(vars(&[
            ("WAREHOUSE__BACKUP__HOST", "warehouse-c.internal"),
            ("WAREHOUSE__RECOVERY__ENABLED", "false"),
            ("DB_PASS", "rotated"),
        ]))
        .load()
        .unwrap();

    assert_eq!(config.backup.host, "warehouse-c.internal");
    assert!(!config.recovery.enabled);
    assert_eq!(config.primary.password, "rotated");
    // Untouched file values survive
    assert_eq!(config.primary.port, 5433);
}

#[test]
fn test_numeric_looking_credentials_kept_verbatim() {
    let (_dir, path) = write_config(SAMPLE_CONFIG);
    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env_vars(vars(&[
            ("WAREHOUSE__PRIMARY__PASSWORD", "00123"),
            ("WAREHOUSE__BACKUP__PASSWORD", "1e3"),
            ("WAREHOUSE__BACKUP__USERNAME", "007"),
            ("WAREHOUSE__BACKUP__DATABASE", "0042"),
            ("WAREHOUSE__BACKUP__PORT", "6543"),
            ("WAREHOUSE__PROBE__VALIDATION_TTL_MS", "250"),
        ]))
        .load()
        .unwrap();

    assert_eq!(config.primary.password, "00123");
    assert_eq!(config.backup.password, "1e3");
    assert_eq!(config.backup.username, "007");
    assert_eq!(config.backup.database, "0042");
    // Typed fields are still converted from their string form
    assert_eq!(config.backup.port, 6543);
    assert_eq!(config.probe.validation_ttl_ms, 250);
}

#[test]
fn test_config_path_from_environment() {
    let (_dir, path) = write_config(SAMPLE_CONFIG);
    let path = path.to_string_lossy().to_string();
    let config = ConfigLoader::new()
        .with_env_vars(vars(&[("WAREHOUSE_CONFIG_PATH", path.as_str())]))
        .load()
        .unwrap();

    assert_eq!(config.primary.host, "warehouse-a.internal");
}

#[test]
fn test_duplicate_endpoints_rejected() {
    let (_dir, path) = write_config(SAMPLE_CONFIG);
    let err = ConfigLoader::new()
        .with_file(&path)
        .with_env_vars(vars(&[
            ("WAREHOUSE__BACKUP__HOST", "warehouse-a.internal"),
            ("WAREHOUSE__BACKUP__PORT", "5433"),
        ]))
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigurationError::DuplicateEndpoints { .. }));
}

#[test]
fn test_zero_recovery_interval_rejected() {
    let (_dir, path) = write_config(SAMPLE_CONFIG);
    let err = ConfigLoader::new()
        .with_file(&path)
        .with_env_vars(vars(&[("WAREHOUSE__RECOVERY__INTERVAL_SECS", "0")]))
        .load()
        .unwrap_err();

    assert!(err.to_string().contains("recovery.interval_secs"));
}

#[test]
fn test_malformed_file_is_load_error() {
    let (_dir, path) = write_config("[primary\nhost = ");
    let err = ConfigLoader::new()
        .with_file(&path)
        .with_env_vars(HashMap::new())
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigurationError::Load { .. }));
}

#[test]
fn test_sanitized_view_masks_passwords() {
    let (_dir, path) = write_config(SAMPLE_CONFIG);
    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env_vars(HashMap::new())
        .load()
        .unwrap();

    let sanitized = config.sanitized();
    assert_eq!(sanitized["primary"]["password"], "[MASKED]");
    assert_eq!(sanitized["backup"]["password"], "[EMPTY]");
    assert_eq!(sanitized["primary"]["host"], "warehouse-a.internal");
    assert!(!sanitized.to_string().contains("primary-secret"));
}

#[test]
fn test_registry_built_from_loaded_config() {
    let (_dir, path) = write_config(SAMPLE_CONFIG);
    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env_vars(HashMap::new())
        .load()
        .unwrap();

    let registry = EndpointRegistry::from_config(&config).unwrap();
    assert_eq!(registry.get(EndpointRole::Primary).host(), "warehouse-a.internal");
    assert_eq!(registry.get(EndpointRole::Backup).port(), 5432);
    assert!(!format!("{:?}", registry).contains("primary-secret"));
}

fn hostname_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,20}"
}

proptest! {
    /// Any pair of distinct endpoints with a valid port loads cleanly
    #[test]
    fn distinct_endpoints_always_validate(
        primary in hostname_strategy(),
        backup in hostname_strategy(),
        port in 1u16..=u16::MAX,
    ) {
        prop_assume!(primary != backup);
        let port = port.to_string();
        let result = ConfigLoader::new()
            .with_env_vars(vars(&[
                ("DB_HOST", primary.as_str()),
                ("DB_PORT", port.as_str()),
                ("DB_NAME", "reports"),
                ("DB_USERNAME", "reporter"),
                ("BACKUP_DB_HOST", backup.as_str()),
                ("BACKUP_DB_NAME", "reports"),
                ("BACKUP_DB_USERNAME", "reporter"),
            ]))
            .load();

        prop_assert!(result.is_ok(), "{:?}", result);
        let config = result.unwrap();
        prop_assert_eq!(config.primary.host, primary);
        prop_assert_eq!(config.backup.host, backup);
    }
}
