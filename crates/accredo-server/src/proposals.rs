//! Proposal endpoints

use accredo_core::{
    Proposal, ProposalAction, ProposalId, ProposalState, TimelockEntry, Vote, VoteSupport,
    WalletAddress,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

use crate::auth::Caller;
use crate::error::ApiResult;
use crate::state::AppState;

/// A proposal together with its state at the current block and time
#[derive(Debug, Serialize)]
pub struct ProposalView {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub current_state: ProposalState,
}

#[derive(Debug, Deserialize)]
pub struct CreateProposalRequest {
    pub action: ProposalAction,
    pub target: Option<WalletAddress>,
    pub description: String,
}

/// `POST /proposals`
pub async fn create_proposal(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(body): Json<CreateProposalRequest>,
) -> ApiResult<impl IntoResponse> {
    let proposal = state
        .governor
        .create_proposal(&caller, body.action, body.target, &body.description)
        .await?;
    let current_state = proposal.state;
    Ok((
        StatusCode::CREATED,
        Json(ProposalView {
            proposal,
            current_state,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ProposalQuery {
    /// Filter on the effective state, e.g. `?state=Active`
    pub state: Option<ProposalState>,
}

/// `GET /proposals`
pub async fn list_proposals(
    State(state): State<AppState>,
    Query(query): Query<ProposalQuery>,
) -> ApiResult<Json<Vec<ProposalView>>> {
    let engine = state.governor.engine();
    let mut views = Vec::new();
    for proposal in engine.list().await? {
        let current_state = engine.state(&proposal.id).await?;
        if query.state.map_or(true, |wanted| wanted == current_state) {
            views.push(ProposalView {
                proposal,
                current_state,
            });
        }
    }
    views.sort_by(|a, b| b.proposal.created_at.cmp(&a.proposal.created_at));
    Ok(Json(views))
}

/// `GET /proposals/:id`
pub async fn get_proposal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProposalView>> {
    let id: ProposalId = id.parse()?;
    let (proposal, current_state) = state.governor.proposal(&id).await?;
    Ok(Json(ProposalView {
        proposal,
        current_state,
    }))
}

/// `GET /proposals/:id/votes`
pub async fn list_votes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Vote>>> {
    let id: ProposalId = id.parse()?;
    let engine = state.governor.engine();
    engine.require(&id).await?;
    Ok(Json(engine.votes(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub support: VoteSupport,
    pub reason: Option<String>,
}

/// `POST /proposals/:id/votes`
pub async fn cast_vote(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(body): Json<CastVoteRequest>,
) -> ApiResult<impl IntoResponse> {
    let id: ProposalId = id.parse()?;
    let vote = state
        .governor
        .cast_vote(&caller, &id, body.support, body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub id: ProposalId,
    pub state: ProposalState,
}

/// `POST /proposals/:id/resolve`
pub async fn resolve_proposal(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<ResolveResponse>> {
    let id: ProposalId = id.parse()?;
    let resolved = state.governor.resolve(&caller, &id).await?;
    Ok(Json(ResolveResponse { id, state: resolved }))
}

/// `POST /proposals/:id/queue`
pub async fn queue_proposal(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<TimelockEntry>> {
    let id: ProposalId = id.parse()?;
    Ok(Json(state.governor.queue(&caller, &id).await?))
}

/// `POST /proposals/:id/execute`
pub async fn execute_proposal(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Proposal>> {
    let id: ProposalId = id.parse()?;
    Ok(Json(state.governor.execute(&caller, &id).await?))
}

/// `POST /proposals/:id/cancel`
pub async fn cancel_proposal(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Proposal>> {
    let id: ProposalId = id.parse()?;
    Ok(Json(state.governor.cancel(&caller, &id).await?))
}
