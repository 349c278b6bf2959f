//! Application state

use accredo_chain::{ChainClient, ChainConfig, RetryPolicy};
use accredo_core::EventBus;
use accredo_db::{DatabasePool, Repositories};
use accredo_governance::{run_audit_log, Clock, GovernanceError, Governor, Stores, SystemClock};
use accredo_identity::AuthorizationPolicy;
use accredo_registry::RoleMirror;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::auth::JwtKeys;
use crate::config::ServerConfig;
use crate::middleware::RateLimiter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub governor: Governor,

    pub jwt: Arc<JwtKeys>,

    pub rate_limiter: RateLimiter,

    /// Block height and wall time for governance decisions
    pub clock: Arc<dyn Clock>,

    /// Present when running against PostgreSQL
    pub db: Option<DatabasePool>,

    pub production: bool,

    pub chain_enabled: bool,
}

impl AppState {
    /// State backed by in-memory stores (development and tests)
    pub async fn in_memory(config: &ServerConfig, clock: Arc<dyn Clock>) -> Result<Self, GovernanceError> {
        Self::build(config, Stores::in_memory(), None, clock).await
    }

    /// State over `stores` with a real-time clock whose block zero is the
    /// genesis persisted alongside the parameters
    pub async fn anchored(
        config: &ServerConfig,
        stores: Stores,
        db: Option<DatabasePool>,
    ) -> Result<Self, GovernanceError> {
        let clock =
            SystemClock::anchored(stores.parameters.as_ref(), config.governance.block_time_secs)
                .await?;
        Self::build(config, stores, db, Arc::new(clock)).await
    }

    pub async fn with_database(config: &ServerConfig, db: DatabasePool) -> Result<Self, GovernanceError> {
        let stores = Repositories::new(&db).stores();
        Self::anchored(config, stores, Some(db)).await
    }

    async fn build(
        config: &ServerConfig,
        stores: Stores,
        db: Option<DatabasePool>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GovernanceError> {
        let events = EventBus::default();
        // subscribe before anything can publish, bootstrap included
        tokio::spawn(run_audit_log(stores.audit.clone(), events.subscribe()));

        let governor = Governor::open(
            stores,
            config.governance.clone(),
            config.suspension_policy,
            AuthorizationPolicy::default(),
            clock.clone(),
            events,
        )
        .await?;

        for admin in &config.bootstrap_admins {
            governor.bootstrap_admin(*admin, "Administrator").await?;
        }

        Ok(Self {
            governor,
            jwt: Arc::new(JwtKeys::new(config.jwt_secret.as_bytes(), &config.jwt_issuer)),
            rate_limiter: RateLimiter::new(config.rate_limiter()),
            clock,
            db,
            production: config.production,
            chain_enabled: false,
        })
    }

    /// Start mirroring issuer eligibility to the chain. Unresolved
    /// transactions from a previous run are reconciled first.
    pub fn spawn_role_mirror(&mut self, chain: Arc<dyn ChainClient>, config: &ChainConfig) -> JoinHandle<()> {
        let mirror = RoleMirror::new(self.governor.registry().clone(), chain)
            .with_retry(RetryPolicy::with_attempts(config.max_attempts))
            .with_confirmation(config.poll_interval(), config.confirmation_timeout());
        let events = self.governor.events().subscribe();
        self.chain_enabled = true;

        tokio::spawn(async move {
            match mirror.reconcile().await {
                Ok(settled) if settled > 0 => {
                    tracing::info!(settled, "reconciled outstanding role transactions")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "role reconciliation failed"),
            }
            mirror.run(events).await;
        })
    }
}
