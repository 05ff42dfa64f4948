//! PostgreSQL backend built on SQLx pools.

use super::backend::ConnectionBackend;
use crate::config::PoolConfig;
use crate::endpoint::EndpointDescriptor;
use crate::error::WarehouseResult;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{Connection, PgConnection, PgPool, Row};
use tracing::debug;

/// Builds one `PgPool` per handle
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool_config: PoolConfig,
}

impl PgBackend {
    pub fn new(pool_config: PoolConfig) -> Self {
        Self { pool_config }
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    /// Translate a descriptor into SQLx connect options
    pub fn connect_options(endpoint: &EndpointDescriptor) -> PgConnectOptions {
        // Trusting the server certificate keeps TLS when offered but skips verification
        let ssl_mode = if endpoint.trust_server_certificate() {
            PgSslMode::Prefer
        } else {
            PgSslMode::VerifyFull
        };

        PgConnectOptions::new()
            .host(endpoint.host())
            .port(endpoint.port())
            .database(endpoint.database())
            .username(endpoint.credentials().username())
            .password(endpoint.credentials().password())
            .application_name(endpoint.application_name())
            .ssl_mode(ssl_mode)
            .options(endpoint.options().iter())
    }
}

#[async_trait]
impl ConnectionBackend for PgBackend {
    type Handle = PgPool;

    async fn open(&self, endpoint: &EndpointDescriptor) -> WarehouseResult<PgPool> {
        debug!(
            endpoint = %endpoint,
            max_connections = self.pool_config.max_connections,
            "Creating warehouse connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(self.pool_config.max_connections)
            .min_connections(self.pool_config.min_connections)
            .acquire_timeout(self.pool_config.acquire_timeout())
            .idle_timeout(Some(self.pool_config.idle_timeout()))
            .max_lifetime(Some(self.pool_config.max_lifetime()))
            .test_before_acquire(true)
            .connect_with(Self::connect_options(endpoint))
            .await?;

        Ok(pool)
    }

    async fn ping_endpoint(&self, endpoint: &EndpointDescriptor) -> WarehouseResult<()> {
        let mut conn = PgConnection::connect_with(&Self::connect_options(endpoint)).await?;
        let result = sqlx::query("SELECT 1").execute(&mut conn).await;
        // Close even when the statement failed; a dropped future drops `conn` instead
        let _ = conn.close().await;
        result?;
        Ok(())
    }

    async fn ping_handle(&self, handle: &PgPool) -> WarehouseResult<()> {
        let row = sqlx::query("SELECT 1 as health").fetch_one(handle).await?;
        let _health: i32 = row.try_get("health")?;
        Ok(())
    }

    async fn close(&self, handle: &PgPool) {
        handle.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::endpoint::EndpointRole;

    #[test]
    fn test_connect_options_follow_descriptor() {
        let mut config = EndpointConfig {
            host: "warehouse-a".to_string(),
            port: 6543,
            database: "reports".to_string(),
            username: "reporter".to_string(),
            ..EndpointConfig::default()
        };
        config.trust_server_certificate = false;
        let endpoint = EndpointDescriptor::from_config(EndpointRole::Primary, &config);

        let options = PgBackend::connect_options(&endpoint);
        assert_eq!(options.get_host(), "warehouse-a");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("reports"));
        assert_eq!(options.get_username(), "reporter");
        assert!(matches!(options.get_ssl_mode(), PgSslMode::VerifyFull));
    }
}
