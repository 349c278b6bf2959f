//! API error responses

use accredo_core::{AccredoError, ErrorKind};
use accredo_governance::GovernanceError;
use accredo_identity::IdentityError;
use accredo_registry::RegistryError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    Governance(#[from] GovernanceError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Validation(#[from] AccredoError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized(_) | ApiError::RateLimited { .. } => ErrorKind::Authorization,
            ApiError::Governance(e) => e.kind(),
            ApiError::Identity(e) => e.kind(),
            ApiError::Registry(e) => e.kind(),
            ApiError::Validation(e) => e.kind(),
            ApiError::Internal(_) => ErrorKind::ExternalDependency,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Authorization => StatusCode::FORBIDDEN,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::StateConflict => StatusCode::CONFLICT,
                ErrorKind::ExternalDependency => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = %kind, "request failed");
        } else {
            tracing::debug!(error = %self, kind = %kind, "request rejected");
        }

        let body = Json(json!({
            "error": kind.as_str(),
            "message": self.to_string(),
            "retryable": kind.is_retryable(),
        }));

        match self {
            ApiError::RateLimited { retry_after_secs } => (
                status,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
