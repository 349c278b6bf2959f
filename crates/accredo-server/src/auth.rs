//! Bearer token authentication
//!
//! Tokens only prove which wallet is calling. Roles are always looked up in
//! the identity store by the governor.

use accredo_core::WalletAddress;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Caller wallet address
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
}

impl JwtKeys {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    pub fn issue(&self, address: &WalletAddress, ttl: Duration) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: address.to_hex(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("token encoding failed: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<WalletAddress, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| ApiError::Unauthorized(format!("invalid token: {e}")))?;
        WalletAddress::parse(&data.claims.sub)
            .map_err(|e| ApiError::Unauthorized(format!("invalid token subject: {e}")))
    }
}

/// The authenticated wallet behind a request. Extraction also charges the
/// caller's rate limit.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub WalletAddress);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("expected a bearer token".into()))?;

        let address = state.jwt.verify(token.trim())?;

        state
            .rate_limiter
            .check(&address.to_hex())
            .await
            .map_err(|info| ApiError::RateLimited {
                retry_after_secs: info.reset_after.as_secs().max(1),
            })?;

        Ok(Caller(address))
    }
}
