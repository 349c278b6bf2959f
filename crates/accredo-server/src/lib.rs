//! Accredo Server Library
//!
//! HTTP API over the accreditation governor. The library exposes the
//! router and state for integration testing; the binary handles startup.

pub mod auth;
pub mod config;
pub mod error;
pub mod issuers;
pub mod middleware;
pub mod proposals;
pub mod routes;
pub mod state;

use accredo_chain::JsonRpcChainClient;
use accredo_db::{DatabaseConfig, DatabasePool};
use accredo_governance::Stores;
use anyhow::Context;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::state::AppState;

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Build the CORS layer. `*` allows any origin; otherwise only the listed
/// origins are allowed.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .max_age(Duration::from_secs(3600))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health))
        // Identity
        .route("/accounts", post(routes::register_account))
        .route("/accounts/:address", get(routes::get_account))
        .route("/accounts/:address/deactivate", post(routes::deactivate_account))
        .route("/accounts/:address/reactivate", post(routes::reactivate_account))
        .route("/accounts/:address/weight", post(routes::set_voting_weight))
        // Issuers
        .route(
            "/issuers",
            get(issuers::list_issuers).post(issuers::register_issuer),
        )
        .route("/issuers/:address", get(issuers::get_issuer))
        .route("/issuers/:address/eligibility", get(issuers::issuer_eligibility))
        .route("/issuers/:address/credentials", get(issuers::issuer_credentials))
        .route("/issuers/:address/accredit", post(issuers::accredit_issuer))
        .route("/issuers/:address/suspend", post(issuers::suspend_issuer))
        .route("/issuers/:address/revoke", post(issuers::revoke_issuer))
        // Credentials
        .route("/credentials", post(issuers::issue_credential))
        .route("/credentials/:token_id", get(issuers::get_credential))
        .route("/credentials/:token_id/revoke", post(issuers::revoke_credential))
        // Governance
        .route("/governance/params", get(routes::governance_params))
        .route(
            "/proposals",
            get(proposals::list_proposals).post(proposals::create_proposal),
        )
        .route("/proposals/:id", get(proposals::get_proposal))
        .route(
            "/proposals/:id/votes",
            get(proposals::list_votes).post(proposals::cast_vote),
        )
        .route("/proposals/:id/resolve", post(proposals::resolve_proposal))
        .route("/proposals/:id/queue", post(proposals::queue_proposal))
        .route("/proposals/:id/execute", post(proposals::execute_proposal))
        .route("/proposals/:id/cancel", post(proposals::cancel_proposal))
        .route("/audit", get(routes::audit_log))
}

/// Create the router with all routes and layers configured
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    api_routes()
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::security_headers_middleware,
        ))
        .with_state(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Build state from `config` and serve until Ctrl-C
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let mut state = match &config.database_url {
        Some(url) => {
            let db = DatabasePool::new(&DatabaseConfig::new(url.clone()))
                .await
                .context("connecting to PostgreSQL")?;
            db.run_migrations().await.context("running migrations")?;
            AppState::with_database(&config, db).await?
        }
        None => {
            tracing::warn!("no database_url configured; state is kept in memory only");
            AppState::anchored(&config, Stores::in_memory(), None).await?
        }
    };

    if let Some(chain) = &config.chain {
        let client = JsonRpcChainClient::new(chain.clone()).context("building chain client")?;
        state.spawn_role_mirror(Arc::new(client), chain);
        tracing::info!(rpc_url = %chain.rpc_url, "issuer role mirror started");
    }

    let limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            limiter.cleanup().await;
        }
    });

    let db = state.db.clone();
    let app = create_router(state, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(bind = %config.bind, "accredo server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = db {
        db.close().await;
    }
    tracing::info!("accredo server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
