//! Test utilities for integration tests

use accredo_core::{GovernanceParams, WalletAddress};
use accredo_governance::ManualClock;
use accredo_server::config::{RateLimitSettings, ServerConfig};
use accredo_server::state::AppState;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub fn address(n: u8) -> WalletAddress {
    WalletAddress::from_bytes([n; 20])
}

pub fn test_params() -> GovernanceParams {
    GovernanceParams {
        voting_delay_blocks: 1,
        voting_period_blocks: 10,
        quorum: 2,
        proposal_threshold: 1,
        timelock_delay_secs: 100,
        minimum_delay_secs: 100,
        grace_period_secs: 50,
        block_time_secs: 12,
    }
}

/// Test application wrapper
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub admin: WalletAddress,
}

impl TestApp {
    /// In-memory application with one bootstrap admin
    pub async fn new() -> Self {
        Self::with_rate_limit(RateLimitSettings {
            max_requests: 10_000,
            window_secs: 60,
            burst: 0,
        })
        .await
    }

    pub async fn with_rate_limit(rate_limit: RateLimitSettings) -> Self {
        let admin = address(0xAD);
        let config = ServerConfig {
            jwt_secret: JWT_SECRET.to_string(),
            bootstrap_admins: vec![admin],
            governance: test_params(),
            rate_limit,
            ..ServerConfig::default()
        };

        let clock = Arc::new(ManualClock::starting_now());
        let state = AppState::in_memory(&config, clock.clone()).await.unwrap();
        let router = accredo_server::create_router(state.clone(), &config.cors_origins);

        Self {
            router,
            state,
            clock,
            admin,
        }
    }

    /// Get the router for making requests
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn token(&self, who: &WalletAddress) -> String {
        self.state
            .jwt
            .issue(who, chrono::Duration::hours(1))
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, as_caller: Option<&WalletAddress>) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(who) = as_caller {
            builder = builder.header("Authorization", format!("Bearer {}", self.token(who)));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str, as_caller: &WalletAddress, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", format!("Bearer {}", self.token(as_caller)))
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Register an account through the API as the bootstrap admin
    pub async fn register(&self, who: &WalletAddress, role: &str, weight: u64) {
        let (status, body) = self
            .post(
                "/accounts",
                &self.admin,
                serde_json::json!({
                    "address": who,
                    "role": role,
                    "display_name": format!("{role} {who}"),
                    "voting_weight": weight,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {who}: {body}");
    }
}
