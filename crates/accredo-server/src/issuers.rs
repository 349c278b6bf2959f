//! Issuer registry and credential ledger endpoints

use accredo_core::{CredentialRecord, IssuerRecord, IssuerState, TokenId, WalletAddress};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::error::ApiResult;
use crate::routes::parse_address;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterIssuerRequest {
    /// Defaults to the caller
    pub address: Option<WalletAddress>,
    pub name: String,
    pub metadata_uri: Option<String>,
}

/// `POST /issuers`
pub async fn register_issuer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(body): Json<RegisterIssuerRequest>,
) -> ApiResult<impl IntoResponse> {
    let address = body.address.unwrap_or(caller);
    let record = state
        .governor
        .register_issuer(&caller, address, &body.name, body.metadata_uri)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /issuers`
pub async fn list_issuers(State(state): State<AppState>) -> ApiResult<Json<Vec<IssuerRecord>>> {
    Ok(Json(state.governor.registry().list().await?))
}

/// `GET /issuers/:address`
pub async fn get_issuer(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<IssuerRecord>> {
    let address = parse_address(&address)?;
    Ok(Json(state.governor.registry().require(&address).await?))
}

#[derive(Debug, Serialize)]
pub struct EligibilityResponse {
    pub address: WalletAddress,
    pub eligible: bool,
    pub state: IssuerState,
}

/// `GET /issuers/:address/eligibility`
///
/// Unknown addresses are simply ineligible.
pub async fn issuer_eligibility(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<EligibilityResponse>> {
    let address = parse_address(&address)?;
    let registry = state.governor.registry();
    Ok(Json(EligibilityResponse {
        address,
        eligible: registry.is_eligible_issuer(&address).await?,
        state: registry.state_of(&address).await?,
    }))
}

/// `GET /issuers/:address/credentials`
pub async fn issuer_credentials(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<Vec<CredentialRecord>>> {
    let address = parse_address(&address)?;
    Ok(Json(
        state
            .governor
            .registry()
            .credentials_by_issuer(&address)
            .await?,
    ))
}

/// `POST /issuers/:address/accredit`
pub async fn accredit_issuer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(address): Path<String>,
) -> ApiResult<Json<IssuerRecord>> {
    let address = parse_address(&address)?;
    Ok(Json(state.governor.accredit_issuer(&caller, &address).await?))
}

#[derive(Debug, Deserialize)]
pub struct SuspendRequest {
    pub reason: String,
}

/// `POST /issuers/:address/suspend`
pub async fn suspend_issuer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(address): Path<String>,
    Json(body): Json<SuspendRequest>,
) -> ApiResult<Json<IssuerRecord>> {
    let address = parse_address(&address)?;
    Ok(Json(
        state
            .governor
            .suspend_issuer(&caller, &address, &body.reason)
            .await?,
    ))
}

/// `POST /issuers/:address/revoke`
pub async fn revoke_issuer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(address): Path<String>,
) -> ApiResult<Json<IssuerRecord>> {
    let address = parse_address(&address)?;
    Ok(Json(state.governor.revoke_issuer(&caller, &address).await?))
}

// Credentials

#[derive(Debug, Deserialize)]
pub struct IssueCredentialRequest {
    pub token_id: TokenId,
    /// Admins may record on behalf of an issuer; institutes issue as
    /// themselves
    pub issuer: Option<WalletAddress>,
    pub holder: WalletAddress,
    pub metadata_uri: Option<String>,
}

/// `POST /credentials`
pub async fn issue_credential(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(body): Json<IssueCredentialRequest>,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .governor
        .issue_credential(&caller, body.token_id, body.issuer, body.holder, body.metadata_uri)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /credentials/:token_id`
pub async fn get_credential(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> ApiResult<Json<CredentialRecord>> {
    let token_id: TokenId = token_id.parse()?;
    Ok(Json(state.governor.registry().credential(token_id).await?))
}

/// `POST /credentials/:token_id/revoke`
pub async fn revoke_credential(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(token_id): Path<String>,
) -> ApiResult<Json<CredentialRecord>> {
    let token_id: TokenId = token_id.parse()?;
    Ok(Json(state.governor.revoke_credential(&caller, token_id).await?))
}
