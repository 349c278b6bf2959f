//! Health, accounts, parameters and audit endpoints

use accredo_core::{Account, GovernanceParams, Role, WalletAddress};
use accredo_governance::AuditEntry;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 500;

pub(crate) fn parse_address(raw: &str) -> ApiResult<WalletAddress> {
    Ok(WalletAddress::parse(raw)?)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub block_number: u64,
    pub storage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_healthy: Option<bool>,
    pub chain_mirror: bool,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_healthy = match &state.db {
        Some(db) => Some(db.health_check().await.unwrap_or(false)),
        None => None,
    };

    Json(HealthResponse {
        status: if database_healthy == Some(false) { "degraded" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        block_number: state.clock.block_number(),
        storage: if state.db.is_some() { "postgres" } else { "memory" },
        database_healthy,
        chain_mirror: state.chain_enabled,
    })
}

// Accounts

#[derive(Debug, Deserialize)]
pub struct RegisterAccountRequest {
    pub address: WalletAddress,
    pub role: Role,
    pub display_name: String,
    pub metadata_uri: Option<String>,
    /// Admin only
    pub voting_weight: Option<u64>,
}

/// `POST /accounts`
pub async fn register_account(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(body): Json<RegisterAccountRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut account = Account::new(body.address, body.role, body.display_name);
    account.metadata_uri = body.metadata_uri;

    let account = state
        .governor
        .register_account(&caller, account, body.voting_weight)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// `GET /accounts/:address`
pub async fn get_account(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Account>> {
    let address = parse_address(&address)?;
    Ok(Json(state.governor.account(&address).await?))
}

/// `POST /accounts/:address/deactivate`
pub async fn deactivate_account(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(address): Path<String>,
) -> ApiResult<Json<Account>> {
    let address = parse_address(&address)?;
    Ok(Json(state.governor.deactivate_account(&caller, &address).await?))
}

/// `POST /accounts/:address/reactivate`
pub async fn reactivate_account(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(address): Path<String>,
) -> ApiResult<Json<Account>> {
    let address = parse_address(&address)?;
    Ok(Json(state.governor.reactivate_account(&caller, &address).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetWeightRequest {
    pub voting_weight: u64,
}

/// `POST /accounts/:address/weight`
pub async fn set_voting_weight(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(address): Path<String>,
    Json(body): Json<SetWeightRequest>,
) -> ApiResult<Json<Account>> {
    let address = parse_address(&address)?;
    Ok(Json(
        state
            .governor
            .set_voting_weight(&caller, &address, body.voting_weight)
            .await?,
    ))
}

/// `GET /governance/params`
pub async fn governance_params(State(state): State<AppState>) -> Json<GovernanceParams> {
    Json(state.governor.params())
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// `GET /audit`
pub async fn audit_log(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .min(MAX_AUDIT_LIMIT);
    Ok(Json(state.governor.audit_log(&caller, limit).await?))
}
