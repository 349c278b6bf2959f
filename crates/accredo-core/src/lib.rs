//! Accredo Core
//!
//! Core domain types for the Accredo accreditation and governance layer.
//! This crate defines the data structures shared by the identity store,
//! the issuer registry, the proposal engine and the timelock gate.

pub mod account;
pub mod address;
pub mod credential;
pub mod error;
pub mod events;
pub mod issuer;
pub mod locks;
pub mod params;
pub mod proposal;
pub mod timelock;

pub use account::{Account, Role};
pub use address::WalletAddress;
pub use credential::{CredentialRecord, TokenId};
pub use error::{AccredoError, ErrorKind, StoreError};
pub use events::{EventBus, GovernanceEvent};
pub use issuer::{ChainSync, IssuerRecord, IssuerState};
pub use locks::KeyedLocks;
pub use params::{GovernanceParams, ParameterUpdate, MAX_BLOCK_SPAN, MAX_DURATION_SECS};
pub use proposal::{
    Proposal, ProposalAction, ProposalId, ProposalKind, ProposalState, Tally, Vote, VoteSupport,
};
pub use timelock::{TimelockEntry, TimelockStatus};
