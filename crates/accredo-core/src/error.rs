//! Error types for Accredo

use serde::Serialize;
use thiserror::Error;

/// Coarse classification shared by every error in the workspace.
///
/// The HTTP layer maps kinds to status codes; callers use it to decide
/// whether a failure is worth retrying (only `ExternalDependency` is).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input: addresses, roles, enum values, parameters.
    Validation,
    /// Role, ownership or activation check failed.
    Authorization,
    /// The referenced entity does not exist.
    NotFound,
    /// The requested transition is illegal in the current state.
    StateConflict,
    /// Chain RPC, database or another collaborator failed.
    ExternalDependency,
}

impl ErrorKind {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ExternalDependency)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StateConflict => "state_conflict",
            ErrorKind::ExternalDependency => "external_dependency",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation errors raised while parsing domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccredoError {
    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid vote support: {0}")]
    InvalidSupport(String),

    #[error("Invalid proposal action: {0}")]
    InvalidAction(String),

    #[error("Invalid proposal id: {0}")]
    InvalidProposalId(String),

    #[error("Invalid governance parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AccredoError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl From<serde_json::Error> for AccredoError {
    fn from(err: serde_json::Error) -> Self {
        AccredoError::Serialization(err.to_string())
    }
}

/// Errors reported by storage backends (in-memory or PostgreSQL)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    /// A compare-and-swap lost against a concurrent writer
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Duplicate(_) | StoreError::Conflict(_) => ErrorKind::StateConflict,
            StoreError::Backend(_) => ErrorKind::ExternalDependency,
        }
    }
}
