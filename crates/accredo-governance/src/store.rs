//! Storage traits for proposals, timelock entries and parameters, with
//! in-memory implementations (for development/testing)

use accredo_core::{
    GovernanceParams, Proposal, ProposalId, ProposalState, StoreError, TimelockEntry,
    TimelockStatus, Vote, WalletAddress,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait::async_trait]
pub trait ProposalStore: Send + Sync {
    /// Insert a new proposal; `Duplicate` if the id exists
    async fn insert(&self, proposal: Proposal) -> Result<Proposal, StoreError>;

    async fn get(&self, id: &ProposalId) -> Result<Option<Proposal>, StoreError>;

    async fn list(&self) -> Result<Vec<Proposal>, StoreError>;

    /// Store the receipt and add its weight to the tally as one unit.
    /// `Duplicate` if the voter already has a receipt.
    async fn record_vote(&self, vote: Vote) -> Result<Proposal, StoreError>;

    async fn get_vote(&self, id: &ProposalId, voter: &WalletAddress) -> Result<Option<Vote>, StoreError>;

    async fn votes(&self, id: &ProposalId) -> Result<Vec<Vote>, StoreError>;

    /// Move to `to` if the stored state is one of `from`, else `Conflict`.
    /// `eta` is written when given.
    async fn transition(
        &self,
        id: &ProposalId,
        from: &[ProposalState],
        to: ProposalState,
        eta: Option<DateTime<Utc>>,
    ) -> Result<Proposal, StoreError>;
}

#[async_trait::async_trait]
pub trait TimelockStore: Send + Sync {
    /// `Duplicate` if the proposal already has an entry
    async fn insert(&self, entry: TimelockEntry) -> Result<TimelockEntry, StoreError>;

    async fn get(&self, id: &ProposalId) -> Result<Option<TimelockEntry>, StoreError>;

    /// Move `expected -> next`; `Conflict` if the status differs
    async fn set_status(
        &self,
        id: &ProposalId,
        expected: TimelockStatus,
        next: TimelockStatus,
    ) -> Result<TimelockEntry, StoreError>;
}

#[async_trait::async_trait]
pub trait ParameterStore: Send + Sync {
    async fn load(&self) -> Result<Option<GovernanceParams>, StoreError>;

    async fn save(&self, params: &GovernanceParams) -> Result<(), StoreError>;

    /// Block zero of the governance clock. The first call records
    /// `candidate`; every later call returns the recorded instant.
    async fn genesis(&self, candidate: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError>;
}

struct ProposalEntry {
    proposal: Proposal,
    votes: Vec<Vote>,
}

#[derive(Default)]
pub struct InMemoryProposalStore {
    proposals: RwLock<HashMap<ProposalId, ProposalEntry>>,
}

impl InMemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait::async_trait]
impl ProposalStore for InMemoryProposalStore {
    async fn insert(&self, proposal: Proposal) -> Result<Proposal, StoreError> {
        let mut proposals = self.proposals.write().map_err(backend)?;
        if proposals.contains_key(&proposal.id) {
            return Err(StoreError::Duplicate(proposal.id.to_string()));
        }
        proposals.insert(
            proposal.id,
            ProposalEntry {
                proposal: proposal.clone(),
                votes: Vec::new(),
            },
        );
        Ok(proposal)
    }

    async fn get(&self, id: &ProposalId) -> Result<Option<Proposal>, StoreError> {
        let proposals = self.proposals.read().map_err(backend)?;
        Ok(proposals.get(id).map(|e| e.proposal.clone()))
    }

    async fn list(&self) -> Result<Vec<Proposal>, StoreError> {
        let proposals = self.proposals.read().map_err(backend)?;
        let mut all: Vec<_> = proposals.values().map(|e| e.proposal.clone()).collect();
        all.sort_by_key(|p| p.created_at);
        Ok(all)
    }

    async fn record_vote(&self, vote: Vote) -> Result<Proposal, StoreError> {
        let mut proposals = self.proposals.write().map_err(backend)?;
        let entry = proposals
            .get_mut(&vote.proposal_id)
            .ok_or_else(|| StoreError::NotFound(vote.proposal_id.to_string()))?;

        if entry.votes.iter().any(|v| v.voter == vote.voter) {
            return Err(StoreError::Duplicate(format!(
                "{} on {}",
                vote.voter, vote.proposal_id
            )));
        }

        entry.proposal.tally.add(vote.support, vote.weight);
        entry.proposal.updated_at = vote.cast_at;
        entry.votes.push(vote);
        Ok(entry.proposal.clone())
    }

    async fn get_vote(&self, id: &ProposalId, voter: &WalletAddress) -> Result<Option<Vote>, StoreError> {
        let proposals = self.proposals.read().map_err(backend)?;
        Ok(proposals
            .get(id)
            .and_then(|e| e.votes.iter().find(|v| &v.voter == voter).cloned()))
    }

    async fn votes(&self, id: &ProposalId) -> Result<Vec<Vote>, StoreError> {
        let proposals = self.proposals.read().map_err(backend)?;
        proposals
            .get(id)
            .map(|e| e.votes.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn transition(
        &self,
        id: &ProposalId,
        from: &[ProposalState],
        to: ProposalState,
        eta: Option<DateTime<Utc>>,
    ) -> Result<Proposal, StoreError> {
        let mut proposals = self.proposals.write().map_err(backend)?;
        let entry = proposals
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let current = entry.proposal.state;
        if !from.contains(&current) || !current.can_transition_to(to) {
            return Err(StoreError::Conflict(format!(
                "proposal {id} is {current}, cannot move to {to}"
            )));
        }

        entry.proposal.state = to;
        if eta.is_some() {
            entry.proposal.eta = eta;
        }
        entry.proposal.updated_at = Utc::now();
        Ok(entry.proposal.clone())
    }
}

#[derive(Default)]
pub struct InMemoryTimelockStore {
    entries: RwLock<HashMap<ProposalId, TimelockEntry>>,
}

impl InMemoryTimelockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TimelockStore for InMemoryTimelockStore {
    async fn insert(&self, entry: TimelockEntry) -> Result<TimelockEntry, StoreError> {
        let mut entries = self.entries.write().map_err(backend)?;
        if entries.contains_key(&entry.proposal_id) {
            return Err(StoreError::Duplicate(entry.proposal_id.to_string()));
        }
        entries.insert(entry.proposal_id, entry.clone());
        Ok(entry)
    }

    async fn get(&self, id: &ProposalId) -> Result<Option<TimelockEntry>, StoreError> {
        let entries = self.entries.read().map_err(backend)?;
        Ok(entries.get(id).cloned())
    }

    async fn set_status(
        &self,
        id: &ProposalId,
        expected: TimelockStatus,
        next: TimelockStatus,
    ) -> Result<TimelockEntry, StoreError> {
        let mut entries = self.entries.write().map_err(backend)?;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if entry.status != expected {
            return Err(StoreError::Conflict(format!(
                "timelock entry {id} is {}",
                entry.status.as_str()
            )));
        }
        entry.status = next;
        Ok(entry.clone())
    }
}

#[derive(Default)]
pub struct InMemoryParameterStore {
    params: RwLock<Option<GovernanceParams>>,
    genesis: RwLock<Option<DateTime<Utc>>>,
}

impl InMemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ParameterStore for InMemoryParameterStore {
    async fn load(&self) -> Result<Option<GovernanceParams>, StoreError> {
        Ok(self.params.read().map_err(backend)?.clone())
    }

    async fn save(&self, params: &GovernanceParams) -> Result<(), StoreError> {
        *self.params.write().map_err(backend)? = Some(params.clone());
        Ok(())
    }

    async fn genesis(&self, candidate: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError> {
        Ok(*self
            .genesis
            .write()
            .map_err(backend)?
            .get_or_insert(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accredo_core::{ProposalAction, Tally, VoteSupport};

    fn proposal() -> Proposal {
        let proposer = WalletAddress::from_bytes([1u8; 20]);
        let now = Utc::now();
        Proposal {
            id: ProposalId::derive(&proposer, &ProposalAction::RevokeIssuer, None, "t", now),
            proposer,
            action: ProposalAction::RevokeIssuer,
            target: Some(WalletAddress::from_bytes([2u8; 20])),
            description: "t".into(),
            tally: Tally::default(),
            state: ProposalState::Pending,
            start_block: 1,
            end_block: 10,
            eta: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn vote(id: ProposalId, voter: u8, support: VoteSupport, weight: u64) -> Vote {
        Vote {
            proposal_id: id,
            voter: WalletAddress::from_bytes([voter; 20]),
            support,
            weight,
            reason: None,
            cast_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_vote_leaves_tally() {
        let store = InMemoryProposalStore::new();
        let p = store.insert(proposal()).await.unwrap();

        store
            .record_vote(vote(p.id, 9, VoteSupport::For, 4))
            .await
            .unwrap();
        let err = store
            .record_vote(vote(p.id, 9, VoteSupport::Against, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let stored = store.get(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.tally.for_votes, 4);
        assert_eq!(stored.tally.against_votes, 0);
        assert_eq!(store.votes(&p.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transition_guards_state() {
        let store = InMemoryProposalStore::new();
        let p = store.insert(proposal()).await.unwrap();

        let err = store
            .transition(&p.id, &[ProposalState::Succeeded], ProposalState::Queued, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store
            .transition(
                &p.id,
                &[ProposalState::Pending, ProposalState::Active],
                ProposalState::Succeeded,
                None,
            )
            .await
            .unwrap();

        // backwards moves are refused even when listed
        let err = store
            .transition(&p.id, &[ProposalState::Succeeded], ProposalState::Active, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_timelock_status_is_compare_and_set() {
        let store = InMemoryTimelockStore::new();
        let id = ProposalId::from_bytes([3u8; 32]);
        let now = Utc::now();
        store
            .insert(TimelockEntry::new(id, now, 60, now).unwrap())
            .await
            .unwrap();
        assert!(matches!(
            store.insert(TimelockEntry::new(id, now, 60, now).unwrap()).await,
            Err(StoreError::Duplicate(_))
        ));

        store
            .set_status(&id, TimelockStatus::Scheduled, TimelockStatus::Executed)
            .await
            .unwrap();
        assert!(matches!(
            store
                .set_status(&id, TimelockStatus::Scheduled, TimelockStatus::Executed)
                .await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_genesis_is_recorded_once() {
        let store = InMemoryParameterStore::new();
        let first = Utc::now() - chrono::Duration::days(3);

        assert_eq!(store.genesis(first).await.unwrap(), first);
        assert_eq!(store.genesis(Utc::now()).await.unwrap(), first);
    }
}
