//! Accredo Identity
//!
//! Account records keyed by wallet address, plus the central table that
//! maps every state-changing operation to the roles allowed to perform it.

pub mod policy;
pub mod store;

pub use policy::{AuthorizationPolicy, Authorizer, Operation};
pub use store::{AccountStore, IdentityStore, InMemoryAccountStore};

use accredo_core::{AccredoError, ErrorKind, Role, StoreError, WalletAddress};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Account not found: {0}")]
    AccountNotFound(WalletAddress),

    #[error("Account already exists: {0}")]
    DuplicateAccount(WalletAddress),

    #[error("Account is deactivated: {0}")]
    AccountInactive(WalletAddress),

    #[error("Role {role} may not perform {operation}")]
    Forbidden { operation: Operation, role: Role },

    #[error("Only an admin may grant the {0} role")]
    PrivilegedRole(Role),

    #[error(transparent)]
    Validation(#[from] AccredoError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::AccountNotFound(_) => ErrorKind::NotFound,
            IdentityError::DuplicateAccount(_) => ErrorKind::StateConflict,
            IdentityError::AccountInactive(_)
            | IdentityError::Forbidden { .. }
            | IdentityError::PrivilegedRole(_) => ErrorKind::Authorization,
            IdentityError::Validation(e) => e.kind(),
            IdentityError::Storage(_) => ErrorKind::ExternalDependency,
        }
    }
}

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        IdentityError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
