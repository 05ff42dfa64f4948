//! # Endpoint Registry
//!
//! Immutable descriptors for the two warehouse targets. A registry is built
//! once from validated configuration and shared read-only for the lifetime
//! of the process.

use crate::config::{ConfigResult, EndpointConfig, WarehouseConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which of the two configured targets a descriptor or handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    Primary,
    Backup,
}

impl EndpointRole {
    /// Connection priority order
    pub const PRIORITY: [EndpointRole; 2] = [EndpointRole::Primary, EndpointRole::Backup];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointRole::Primary => "primary",
            EndpointRole::Backup => "backup",
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username and password for an endpoint. The password never appears in
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[MASKED]")
            .finish()
    }
}

/// Immutable connection target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    role: EndpointRole,
    host: String,
    port: u16,
    database: String,
    credentials: Credentials,
    trust_server_certificate: bool,
    application_name: String,
    connect_timeout: Duration,
    options: BTreeMap<String, String>,
}

impl EndpointDescriptor {
    pub fn from_config(role: EndpointRole, config: &EndpointConfig) -> Self {
        Self {
            role,
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            credentials: Credentials::new(config.username.clone(), config.password.clone()),
            trust_server_certificate: config.trust_server_certificate,
            application_name: config.application_name.clone(),
            connect_timeout: config.connect_timeout(),
            options: config.options.clone(),
        }
    }

    pub fn role(&self) -> EndpointRole {
        self.role
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn trust_server_certificate(&self) -> bool {
        self.trust_server_certificate
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }
}

impl fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{}/{})",
            self.role, self.host, self.port, self.database
        )
    }
}

/// The Primary and Backup descriptors
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    primary: Arc<EndpointDescriptor>,
    backup: Arc<EndpointDescriptor>,
}

impl EndpointRegistry {
    pub fn new(primary: EndpointDescriptor, backup: EndpointDescriptor) -> Self {
        Self {
            primary: Arc::new(primary),
            backup: Arc::new(backup),
        }
    }

    /// Validate the configuration and build both descriptors
    pub fn from_config(config: &WarehouseConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::new(
            EndpointDescriptor::from_config(EndpointRole::Primary, &config.primary),
            EndpointDescriptor::from_config(EndpointRole::Backup, &config.backup),
        ))
    }

    pub fn get(&self, role: EndpointRole) -> &Arc<EndpointDescriptor> {
        match role {
            EndpointRole::Primary => &self.primary,
            EndpointRole::Backup => &self.backup,
        }
    }

    pub fn primary(&self) -> &Arc<EndpointDescriptor> {
        &self.primary
    }

    pub fn backup(&self) -> &Arc<EndpointDescriptor> {
        &self.backup
    }
}
