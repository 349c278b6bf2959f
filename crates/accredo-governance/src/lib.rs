//! Accredo Governance
//!
//! DAO proposals over issuer accreditation and governance parameters:
//! creation, weighted voting, resolution, a mandatory timelock, and the
//! [`Governor`] that ties these to the identity and issuer registries.

pub mod audit;
pub mod clock;
pub mod governor;
pub mod params;
pub mod proposal;
pub mod store;
pub mod timelock;

pub use audit::{run_audit_log, AuditEntry, AuditSink, InMemoryAuditLog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use governor::{Governor, Stores};
pub use params::SharedParams;
pub use proposal::ProposalEngine;
pub use store::{
    InMemoryParameterStore, InMemoryProposalStore, InMemoryTimelockStore, ParameterStore,
    ProposalStore, TimelockStore,
};
pub use timelock::TimelockGate;

use accredo_core::{AccredoError, ErrorKind, ProposalId, ProposalState, StoreError, WalletAddress};
use accredo_identity::IdentityError;
use accredo_registry::RegistryError;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GovernanceError {
    #[error("Proposer weight {weight} is below the proposal threshold {threshold}")]
    UnauthorizedProposer { weight: u64, threshold: u64 },

    #[error("Proposal not found: {0}")]
    ProposalNotFound(ProposalId),

    #[error("Proposal {id} is not open for voting (state {state})")]
    ProposalNotActive { id: ProposalId, state: ProposalState },

    #[error("{voter} has already voted on proposal {id}")]
    DuplicateVote { id: ProposalId, voter: WalletAddress },

    #[error("Voting on proposal {id} runs until block {end_block}")]
    VotingNotEnded { id: ProposalId, end_block: u64 },

    #[error("Proposal {id} has not succeeded (state {state})")]
    ProposalNotSucceeded { id: ProposalId, state: ProposalState },

    #[error("Eta {eta} is earlier than the minimum delay allows ({earliest})")]
    InvalidEta {
        eta: DateTime<Utc>,
        earliest: DateTime<Utc>,
    },

    #[error("Proposal {0} is already scheduled")]
    AlreadyScheduled(ProposalId),

    #[error("Proposal {id} cannot execute before {eta}")]
    TooEarly { id: ProposalId, eta: DateTime<Utc> },

    #[error("Proposal {0} missed its execution window")]
    Expired(ProposalId),

    #[error("Proposal {0} is not queued")]
    NotQueued(ProposalId),

    #[error("Proposal {id} is already final (state {state})")]
    ProposalFinalized { id: ProposalId, state: ProposalState },

    #[error("Action requires a target issuer")]
    MissingTarget,

    #[error("Parameter updates take no target")]
    UnexpectedTarget,

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Validation(#[from] AccredoError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl GovernanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GovernanceError::UnauthorizedProposer { .. } => ErrorKind::Authorization,
            GovernanceError::ProposalNotFound(_) => ErrorKind::NotFound,
            GovernanceError::ProposalNotActive { .. }
            | GovernanceError::DuplicateVote { .. }
            | GovernanceError::VotingNotEnded { .. }
            | GovernanceError::ProposalNotSucceeded { .. }
            | GovernanceError::AlreadyScheduled(_)
            | GovernanceError::TooEarly { .. }
            | GovernanceError::Expired(_)
            | GovernanceError::NotQueued(_)
            | GovernanceError::ProposalFinalized { .. } => ErrorKind::StateConflict,
            GovernanceError::InvalidEta { .. }
            | GovernanceError::MissingTarget
            | GovernanceError::UnexpectedTarget => ErrorKind::Validation,
            GovernanceError::Identity(e) => e.kind(),
            GovernanceError::Registry(e) => e.kind(),
            GovernanceError::Validation(e) => e.kind(),
            GovernanceError::Storage(_) => ErrorKind::ExternalDependency,
        }
    }
}

impl From<StoreError> for GovernanceError {
    fn from(err: StoreError) -> Self {
        GovernanceError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
