//! Connection pool and repository factory

use accredo_governance::Stores;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::repos::{
    PgAccountStore, PgAuditLog, PgCredentialLedger, PgIssuerStore, PgParameterStore,
    PgProposalStore, PgTimelockStore,
};
use crate::{DbError, Result};

const DEFAULT_URL: &str = "postgres://localhost/accredo";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
        }
    }
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// `DATABASE_URL`, `DB_MAX_CONNECTIONS` and `DB_MIN_CONNECTIONS`
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            url: std::env::var("DATABASE_URL").unwrap_or(default.url),
            max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(default.max_connections),
            min_connections: env_parse("DB_MIN_CONNECTIONS").unwrap_or(default.min_connections),
            ..default
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!("database connection pool established");
        Ok(Self { pool })
    }

    pub async fn from_env() -> Result<Self> {
        Self::new(&DatabaseConfig::from_env()).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations completed");
        Ok(())
    }

    /// Applied migration versions, oldest first
    pub async fn applied_migrations(&self) -> Result<Vec<i64>> {
        let versions: Vec<(i64,)> =
            sqlx::query_as("SELECT version FROM _sqlx_migrations WHERE success ORDER BY version")
                .fetch_all(&self.pool)
                .await?;
        Ok(versions.into_iter().map(|(v,)| v).collect())
    }

    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(DbError::Query)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }

    pub async fn close(&self) {
        info!("closing database connection pool");
        self.pool.close().await;
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Total connections in the pool
    pub size: u32,
    /// Idle connections
    pub idle: usize,
}

/// Builds PostgreSQL-backed stores sharing one pool
pub struct Repositories {
    pool: PgPool,
}

impl Repositories {
    pub fn new(db: &DatabasePool) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    pub fn stores(&self) -> Stores {
        Stores {
            accounts: Arc::new(PgAccountStore::new(self.pool.clone())),
            issuers: Arc::new(PgIssuerStore::new(self.pool.clone())),
            credentials: Arc::new(PgCredentialLedger::new(self.pool.clone())),
            proposals: Arc::new(PgProposalStore::new(self.pool.clone())),
            timelock: Arc::new(PgTimelockStore::new(self.pool.clone())),
            parameters: Arc::new(PgParameterStore::new(self.pool.clone())),
            audit: Arc::new(PgAuditLog::new(self.pool.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_overrides_url_only() {
        let config = DatabaseConfig::new("postgres://db.internal/accredo");
        assert_eq!(config.url, "postgres://db.internal/accredo");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }
}
