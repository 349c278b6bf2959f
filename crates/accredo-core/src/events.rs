//! Governance events
//!
//! Every committed state change is published on an [`EventBus`]. The audit
//! logger and the on-chain role mirror subscribe to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::account::Role;
use crate::address::WalletAddress;
use crate::credential::TokenId;
use crate::issuer::IssuerState;
use crate::params::GovernanceParams;
use crate::proposal::{ProposalId, ProposalKind, ProposalState, VoteSupport};

/// Default number of buffered events per subscriber
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GovernanceEvent {
    AccountRegistered {
        address: WalletAddress,
        role: Role,
    },
    AccountActivationChanged {
        address: WalletAddress,
        active: bool,
    },
    IssuerRegistered {
        address: WalletAddress,
    },
    AccreditationChanged {
        address: WalletAddress,
        state: IssuerState,
    },
    ProposalCreated {
        id: ProposalId,
        proposer: WalletAddress,
        kind: ProposalKind,
        target: Option<WalletAddress>,
    },
    VoteCast {
        id: ProposalId,
        voter: WalletAddress,
        support: VoteSupport,
        weight: u64,
    },
    ProposalResolved {
        id: ProposalId,
        state: ProposalState,
    },
    ProposalQueued {
        id: ProposalId,
        eta: DateTime<Utc>,
    },
    ProposalExecuted {
        id: ProposalId,
    },
    ProposalCanceled {
        id: ProposalId,
        by: WalletAddress,
    },
    ParametersUpdated {
        params: GovernanceParams,
    },
    CredentialIssued {
        token_id: TokenId,
        issuer: WalletAddress,
        holder: WalletAddress,
    },
    CredentialRevoked {
        token_id: TokenId,
        by: WalletAddress,
    },
}

impl GovernanceEvent {
    /// Short event name used as the audit `event_type`
    pub fn name(&self) -> &'static str {
        match self {
            GovernanceEvent::AccountRegistered { .. } => "account_registered",
            GovernanceEvent::AccountActivationChanged { .. } => "account_activation_changed",
            GovernanceEvent::IssuerRegistered { .. } => "issuer_registered",
            GovernanceEvent::AccreditationChanged { .. } => "accreditation_changed",
            GovernanceEvent::ProposalCreated { .. } => "proposal_created",
            GovernanceEvent::VoteCast { .. } => "vote_cast",
            GovernanceEvent::ProposalResolved { .. } => "proposal_resolved",
            GovernanceEvent::ProposalQueued { .. } => "proposal_queued",
            GovernanceEvent::ProposalExecuted { .. } => "proposal_executed",
            GovernanceEvent::ProposalCanceled { .. } => "proposal_canceled",
            GovernanceEvent::ParametersUpdated { .. } => "parameters_updated",
            GovernanceEvent::CredentialIssued { .. } => "credential_issued",
            GovernanceEvent::CredentialRevoked { .. } => "credential_revoked",
        }
    }

    /// The account the event is primarily about, if any
    pub fn subject(&self) -> Option<WalletAddress> {
        match self {
            GovernanceEvent::AccountRegistered { address, .. }
            | GovernanceEvent::AccountActivationChanged { address, .. }
            | GovernanceEvent::IssuerRegistered { address }
            | GovernanceEvent::AccreditationChanged { address, .. } => Some(*address),
            GovernanceEvent::ProposalCreated { proposer, .. } => Some(*proposer),
            GovernanceEvent::VoteCast { voter, .. } => Some(*voter),
            GovernanceEvent::ProposalCanceled { by, .. }
            | GovernanceEvent::CredentialRevoked { by, .. } => Some(*by),
            GovernanceEvent::CredentialIssued { issuer, .. } => Some(*issuer),
            _ => None,
        }
    }
}

/// Fan-out channel for governance events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GovernanceEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: GovernanceEvent) {
        tracing::debug!(event = event.name(), "publishing governance event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
