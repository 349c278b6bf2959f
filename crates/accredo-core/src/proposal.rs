//! Governance proposal types
//!
//! A proposal asks the DAO to act on an issuer (accredit, revoke,
//! suspend) or to change governance parameters. Its stored state only ever
//! moves forward; the effective state additionally depends on the current
//! block height and wall clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::str::FromStr;

use crate::address::WalletAddress;
use crate::error::AccredoError;
use crate::params::{add_secs, ParameterUpdate};

/// Unique identifier for a proposal (32-byte content hash)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProposalId(pub [u8; 32]);

impl ProposalId {
    /// Derive an id from the proposal contents and creation time
    pub fn derive(
        proposer: &WalletAddress,
        action: &ProposalAction,
        target: Option<&WalletAddress>,
        description: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(proposer.as_bytes());
        // ProposalAction only contains strings and integers
        hasher.update(serde_json::to_vec(action).unwrap_or_default());
        if let Some(target) = target {
            hasher.update(target.as_bytes());
        }
        hasher.update(description.as_bytes());
        hasher.update(
            created_at
                .timestamp_nanos_opt()
                .unwrap_or_else(|| created_at.timestamp())
                .to_be_bytes(),
        );
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ProposalId {
    type Err = AccredoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches("0x");
        let bytes = hex::decode(s).map_err(|e| AccredoError::InvalidProposalId(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AccredoError::InvalidProposalId("expected 32 bytes".into()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for ProposalId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ProposalId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Wire name of a proposal action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalKind {
    AccreditIssuer,
    RevokeIssuer,
    SuspendIssuer,
    UpdateParameters,
}

impl ProposalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalKind::AccreditIssuer => "AccreditIssuer",
            ProposalKind::RevokeIssuer => "RevokeIssuer",
            ProposalKind::SuspendIssuer => "SuspendIssuer",
            ProposalKind::UpdateParameters => "UpdateParameters",
        }
    }
}

impl std::fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalKind {
    type Err = AccredoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AccreditIssuer" | "accredit" => Ok(ProposalKind::AccreditIssuer),
            "RevokeIssuer" | "revoke" => Ok(ProposalKind::RevokeIssuer),
            "SuspendIssuer" | "suspend" => Ok(ProposalKind::SuspendIssuer),
            "UpdateParameters" | "update-parameters" => Ok(ProposalKind::UpdateParameters),
            other => Err(AccredoError::InvalidAction(other.to_string())),
        }
    }
}

/// What a proposal does once executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ProposalAction {
    AccreditIssuer,
    RevokeIssuer,
    SuspendIssuer { reason: String },
    UpdateParameters { update: ParameterUpdate },
}

impl ProposalAction {
    pub fn kind(&self) -> ProposalKind {
        match self {
            ProposalAction::AccreditIssuer => ProposalKind::AccreditIssuer,
            ProposalAction::RevokeIssuer => ProposalKind::RevokeIssuer,
            ProposalAction::SuspendIssuer { .. } => ProposalKind::SuspendIssuer,
            ProposalAction::UpdateParameters { .. } => ProposalKind::UpdateParameters,
        }
    }

    /// Whether the action operates on a target issuer
    pub fn targets_issuer(&self) -> bool {
        !matches!(self, ProposalAction::UpdateParameters { .. })
    }
}

/// Lifecycle state of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    Pending,
    Active,
    Canceled,
    Defeated,
    Succeeded,
    Queued,
    Expired,
    Executed,
}

impl ProposalState {
    pub const ALL: [ProposalState; 8] = [
        ProposalState::Pending,
        ProposalState::Active,
        ProposalState::Canceled,
        ProposalState::Defeated,
        ProposalState::Succeeded,
        ProposalState::Queued,
        ProposalState::Expired,
        ProposalState::Executed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalState::Pending => "Pending",
            ProposalState::Active => "Active",
            ProposalState::Canceled => "Canceled",
            ProposalState::Defeated => "Defeated",
            ProposalState::Succeeded => "Succeeded",
            ProposalState::Queued => "Queued",
            ProposalState::Expired => "Expired",
            ProposalState::Executed => "Executed",
        }
    }

    /// No further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Canceled
                | ProposalState::Defeated
                | ProposalState::Expired
                | ProposalState::Executed
        )
    }

    /// Whether a cancel request is still honoured
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            ProposalState::Pending
                | ProposalState::Active
                | ProposalState::Succeeded
                | ProposalState::Queued
        )
    }

    /// Allowed forward transitions between stored states
    pub fn can_transition_to(&self, next: ProposalState) -> bool {
        use ProposalState::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Canceled)
                | (Pending, Defeated)
                | (Pending, Succeeded)
                | (Active, Canceled)
                | (Active, Defeated)
                | (Active, Succeeded)
                | (Succeeded, Queued)
                | (Succeeded, Canceled)
                | (Queued, Executed)
                | (Queued, Expired)
                | (Queued, Canceled)
        )
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalState {
    type Err = AccredoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProposalState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| AccredoError::InvalidField {
                field: "state",
                reason: format!("unknown proposal state {s}"),
            })
    }
}

/// Vote direction (`0=Against, 1=For, 2=Abstain`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum VoteSupport {
    Against = 0,
    For = 1,
    Abstain = 2,
}

impl TryFrom<u8> for VoteSupport {
    type Error = AccredoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VoteSupport::Against),
            1 => Ok(VoteSupport::For),
            2 => Ok(VoteSupport::Abstain),
            other => Err(AccredoError::InvalidSupport(other.to_string())),
        }
    }
}

impl From<VoteSupport> for u8 {
    fn from(value: VoteSupport) -> Self {
        value as u8
    }
}

impl FromStr for VoteSupport {
    type Err = AccredoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "against" => Ok(VoteSupport::Against),
            "1" | "for" => Ok(VoteSupport::For),
            "2" | "abstain" => Ok(VoteSupport::Abstain),
            other => Err(AccredoError::InvalidSupport(other.to_string())),
        }
    }
}

/// A single vote receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: ProposalId,
    pub voter: WalletAddress,
    pub support: VoteSupport,
    pub weight: u64,
    pub reason: Option<String>,
    pub cast_at: DateTime<Utc>,
}

/// Accumulated voting weight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub for_votes: u64,
    pub against_votes: u64,
    pub abstain_votes: u64,
}

impl Tally {
    /// Add a vote's weight; saturates rather than wrapping
    pub fn add(&mut self, support: VoteSupport, weight: u64) {
        let slot = match support {
            VoteSupport::For => &mut self.for_votes,
            VoteSupport::Against => &mut self.against_votes,
            VoteSupport::Abstain => &mut self.abstain_votes,
        };
        *slot = slot.saturating_add(weight);
    }

    pub fn participation(&self) -> u64 {
        self.for_votes
            .saturating_add(self.against_votes)
            .saturating_add(self.abstain_votes)
    }

    /// `Succeeded` iff for > against and participation reaches quorum
    pub fn outcome(&self, quorum: u64) -> ProposalState {
        if self.for_votes > self.against_votes && self.participation() >= quorum {
            ProposalState::Succeeded
        } else {
            ProposalState::Defeated
        }
    }
}

/// A governance proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub proposer: WalletAddress,
    pub action: ProposalAction,

    /// Issuer the action applies to (absent for parameter updates)
    pub target: Option<WalletAddress>,

    pub description: String,

    #[serde(flatten)]
    pub tally: Tally,

    /// Stored lifecycle state
    pub state: ProposalState,

    /// First block in which votes are accepted
    pub start_block: u64,

    /// Last block in which votes are accepted
    pub end_block: u64,

    /// Earliest execution time, set when queued
    pub eta: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    /// Whether a vote cast at `block` falls inside the voting window
    pub fn voting_open_at(&self, block: u64) -> bool {
        !self.state.is_terminal()
            && self.state != ProposalState::Queued
            && self.state != ProposalState::Succeeded
            && block >= self.start_block
            && block <= self.end_block
    }

    /// Whether the voting window has closed
    pub fn voting_ended_at(&self, block: u64) -> bool {
        block > self.end_block
    }

    /// State as observed at the given block height and time.
    ///
    /// Stored terminal and queued states win; otherwise the state is derived
    /// from the voting window and, once it has closed, from the tally.
    pub fn state_at(
        &self,
        block: u64,
        now: DateTime<Utc>,
        quorum: u64,
        grace_period_secs: u64,
    ) -> ProposalState {
        match self.state {
            ProposalState::Pending | ProposalState::Active => {
                if block < self.start_block {
                    ProposalState::Pending
                } else if block <= self.end_block {
                    ProposalState::Active
                } else {
                    self.tally.outcome(quorum)
                }
            }
            ProposalState::Queued => match self.eta {
                // a deadline past the end of the calendar never passes
                Some(eta)
                    if add_secs(eta, "grace_period_secs", grace_period_secs)
                        .is_ok_and(|deadline| now > deadline) =>
                {
                    ProposalState::Expired
                }
                _ => ProposalState::Queued,
            },
            stored => stored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn proposal(start: u64, end: u64) -> Proposal {
        let proposer = WalletAddress::from_bytes([1u8; 20]);
        let now = Utc::now();
        Proposal {
            id: ProposalId::derive(&proposer, &ProposalAction::AccreditIssuer, None, "x", now),
            proposer,
            action: ProposalAction::AccreditIssuer,
            target: Some(WalletAddress::from_bytes([2u8; 20])),
            description: "x".into(),
            tally: Tally::default(),
            state: ProposalState::Pending,
            start_block: start,
            end_block: end,
            eta: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_outcome_requires_majority_and_quorum() {
        let mut tally = Tally::default();
        tally.add(VoteSupport::For, 10);
        tally.add(VoteSupport::Against, 2);
        assert_eq!(tally.outcome(10), ProposalState::Succeeded);
        assert_eq!(tally.outcome(13), ProposalState::Defeated);

        let mut tied = Tally::default();
        tied.add(VoteSupport::For, 5);
        tied.add(VoteSupport::Against, 5);
        assert_eq!(tied.outcome(1), ProposalState::Defeated);
    }

    #[test]
    fn test_abstain_counts_toward_quorum_only() {
        let mut tally = Tally::default();
        tally.add(VoteSupport::For, 3);
        tally.add(VoteSupport::Abstain, 7);
        assert_eq!(tally.outcome(10), ProposalState::Succeeded);
    }

    #[test]
    fn test_state_follows_voting_window() {
        let p = proposal(10, 20);
        let now = Utc::now();
        assert_eq!(p.state_at(9, now, 1, 60), ProposalState::Pending);
        assert_eq!(p.state_at(10, now, 1, 60), ProposalState::Active);
        assert_eq!(p.state_at(20, now, 1, 60), ProposalState::Active);
        assert_eq!(p.state_at(21, now, 1, 60), ProposalState::Defeated);
    }

    #[test]
    fn test_queued_expires_after_grace() {
        let mut p = proposal(0, 1);
        let eta = Utc::now();
        p.state = ProposalState::Queued;
        p.eta = Some(eta);

        assert_eq!(
            p.state_at(5, eta + Duration::seconds(60), 1, 60),
            ProposalState::Queued
        );
        assert_eq!(
            p.state_at(5, eta + Duration::seconds(61), 1, 60),
            ProposalState::Expired
        );
        assert_eq!(
            p.state_at(5, eta + Duration::days(3650), 1, u64::MAX),
            ProposalState::Queued
        );
    }

    #[test]
    fn test_transitions_only_move_forward() {
        use ProposalState::*;
        assert!(Succeeded.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Executed));
        assert!(!Executed.can_transition_to(Queued));
        assert!(!Defeated.can_transition_to(Succeeded));
        assert!(!Queued.can_transition_to(Succeeded));
        for state in ProposalState::ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_support_wire_values() {
        assert_eq!(VoteSupport::try_from(0).unwrap(), VoteSupport::Against);
        assert_eq!(VoteSupport::try_from(1).unwrap(), VoteSupport::For);
        assert_eq!(VoteSupport::try_from(2).unwrap(), VoteSupport::Abstain);
        assert!(VoteSupport::try_from(3).is_err());
        assert_eq!(serde_json::to_string(&VoteSupport::For).unwrap(), "1");
    }

    #[test]
    fn test_proposal_id_hex_round_trip() {
        let p = proposal(0, 1);
        let parsed: ProposalId = p.id.to_hex().parse().unwrap();
        assert_eq!(parsed, p.id);
        assert!("abcd".parse::<ProposalId>().is_err());
    }

    #[test]
    fn test_action_serializes_with_kind_tag() {
        let action = ProposalAction::SuspendIssuer {
            reason: "fraud".into(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "SuspendIssuer");
        assert_eq!(json["reason"], "fraud");
        assert_eq!(action.kind(), ProposalKind::SuspendIssuer);
    }
}
