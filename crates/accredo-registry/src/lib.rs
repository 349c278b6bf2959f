//! Accredo Registry
//!
//! Issuer lifecycle (registration, accreditation, suspension, revocation),
//! the local credential ledger, and the mirror that keeps the on-chain
//! issuer role in step with accreditation.

pub mod ledger;
pub mod mirror;
pub mod registry;
pub mod store;

pub use ledger::{CredentialLedger, InMemoryCredentialLedger};
pub use mirror::RoleMirror;
pub use registry::IssuerRegistry;
pub use store::{InMemoryIssuerStore, IssuerStore};

use accredo_core::{AccredoError, ErrorKind, StoreError, TokenId, WalletAddress};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Issuer already registered: {0}")]
    DuplicateIssuer(WalletAddress),

    #[error("Issuer not registered: {0}")]
    NotRegistered(WalletAddress),

    #[error("Issuer already accredited: {0}")]
    AlreadyAccredited(WalletAddress),

    #[error("Issuer not accredited: {0}")]
    NotAccredited(WalletAddress),

    #[error("Issuer {0} still has outstanding credentials")]
    OutstandingCredentials(WalletAddress),

    #[error("Issuer is not eligible to issue credentials: {0}")]
    IneligibleIssuer(WalletAddress),

    #[error("Credential not found: {0}")]
    CredentialNotFound(TokenId),

    #[error("Credential already revoked: {0}")]
    CredentialAlreadyRevoked(TokenId),

    #[error("Credential already recorded: {0}")]
    DuplicateCredential(TokenId),

    #[error(transparent)]
    Validation(#[from] AccredoError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotRegistered(_) | RegistryError::CredentialNotFound(_) => {
                ErrorKind::NotFound
            }
            RegistryError::DuplicateIssuer(_)
            | RegistryError::AlreadyAccredited(_)
            | RegistryError::NotAccredited(_)
            | RegistryError::OutstandingCredentials(_)
            | RegistryError::IneligibleIssuer(_)
            | RegistryError::CredentialAlreadyRevoked(_)
            | RegistryError::DuplicateCredential(_) => ErrorKind::StateConflict,
            RegistryError::Validation(e) => e.kind(),
            RegistryError::Storage(_) => ErrorKind::ExternalDependency,
        }
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Whether an issuer with live credentials may be suspended.
///
/// Suspension never touches credentials already issued; this only decides
/// whether outstanding ones block the suspension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionPolicy {
    #[default]
    Allow,
    BlockWhileOutstanding,
}
