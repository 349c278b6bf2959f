//! Rate limiting and security headers

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Requests per window
    pub max_requests: u32,
    pub window: Duration,
    /// Extra requests tolerated on top of `max_requests`
    pub burst: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            burst: 10,
        }
    }
}

#[derive(Clone)]
struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window limiter keyed by caller
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Arc<RwLock<HashMap<String, Window>>>,
}

#[derive(Debug)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub reset_after: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Count one request for `key`
    pub async fn check(&self, key: &str) -> Result<(), RateLimitInfo> {
        let mut state = self.state.write().await;
        let now = Instant::now();

        let window = state.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        let elapsed = now.duration_since(window.started);
        if elapsed > self.config.window {
            window.count = 0;
            window.started = now;
        }

        if window.count >= self.config.max_requests.saturating_add(self.config.burst) {
            tracing::warn!(caller = key, "rate limit exceeded");
            return Err(RateLimitInfo {
                limit: self.config.max_requests,
                reset_after: self.config.window.saturating_sub(elapsed),
            });
        }

        window.count += 1;
        Ok(())
    }

    /// Drop windows idle for more than two periods
    pub async fn cleanup(&self) {
        let mut state = self.state.write().await;
        let now = Instant::now();
        state.retain(|_, w| now.duration_since(w.started) < self.config.window * 2);
    }

    pub async fn tracked(&self) -> usize {
        self.state.read().await.len()
    }
}

pub async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    if state.production {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    response
}
