//! Proposal engine
//!
//! Creation, voting, resolution and queueing. Anything that changes a
//! proposal runs under that proposal's lock, so a vote can never interleave
//! with resolution or queueing of the same proposal.

use accredo_core::{
    Account, AccredoError, EventBus, GovernanceEvent, KeyedLocks, Proposal, ProposalAction, ProposalId,
    ProposalState, StoreError, Tally, TimelockEntry, Vote, VoteSupport, WalletAddress,
};
use accredo_core::params::{add_blocks, add_secs};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use crate::clock::Clock;
use crate::params::SharedParams;
use crate::store::ProposalStore;
use crate::timelock::TimelockGate;
use crate::{GovernanceError, Result};

#[derive(Clone)]
pub struct ProposalEngine {
    store: Arc<dyn ProposalStore>,
    gate: TimelockGate,
    params: SharedParams,
    clock: Arc<dyn Clock>,
    events: EventBus,
    locks: Arc<KeyedLocks<ProposalId>>,
}

impl ProposalEngine {
    pub fn new(
        store: Arc<dyn ProposalStore>,
        gate: TimelockGate,
        params: SharedParams,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            gate,
            params,
            clock,
            events,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn gate(&self) -> &TimelockGate {
        &self.gate
    }

    /// Hold the proposal's lock, for work that spans several steps
    pub async fn lock(&self, id: &ProposalId) -> OwnedMutexGuard<()> {
        self.locks.lock(id).await
    }

    pub async fn create_proposal(
        &self,
        proposer: &Account,
        action: ProposalAction,
        target: Option<WalletAddress>,
        description: &str,
    ) -> Result<Proposal> {
        let params = self.params.get();
        if proposer.voting_weight < params.proposal_threshold {
            return Err(GovernanceError::UnauthorizedProposer {
                weight: proposer.voting_weight,
                threshold: params.proposal_threshold,
            });
        }

        match (&action, target) {
            (ProposalAction::UpdateParameters { update }, None) => {
                // reject updates that could never apply
                params.apply(update)?;
            }
            (ProposalAction::UpdateParameters { .. }, Some(_)) => {
                return Err(GovernanceError::UnexpectedTarget)
            }
            (_, None) => return Err(GovernanceError::MissingTarget),
            (_, Some(_)) => {}
        }

        let now = self.clock.now();
        let start_block = add_blocks(
            self.clock.block_number(),
            "voting_delay_blocks",
            params.voting_delay_blocks,
        )?;
        let end_block = add_blocks(
            start_block,
            "voting_period_blocks",
            params.voting_period_blocks,
        )?;
        let proposal = Proposal {
            id: ProposalId::derive(&proposer.address, &action, target.as_ref(), description, now),
            proposer: proposer.address,
            action,
            target,
            description: description.to_string(),
            tally: Tally::default(),
            state: ProposalState::Pending,
            start_block,
            end_block,
            eta: None,
            created_at: now,
            updated_at: now,
        };

        let proposal = self.store.insert(proposal).await?;
        tracing::info!(
            proposal_id = %proposal.id.short(),
            proposer = %proposal.proposer,
            kind = %proposal.action.kind(),
            start_block = proposal.start_block,
            end_block = proposal.end_block,
            "proposal created"
        );
        self.events.publish(GovernanceEvent::ProposalCreated {
            id: proposal.id,
            proposer: proposal.proposer,
            kind: proposal.action.kind(),
            target: proposal.target,
        });
        Ok(proposal)
    }

    /// Record a vote with the voter's current weight
    pub async fn cast_vote(
        &self,
        id: &ProposalId,
        voter: &Account,
        support: VoteSupport,
        reason: Option<String>,
    ) -> Result<Vote> {
        if voter.voting_weight == 0 {
            return Err(AccredoError::InvalidField {
                field: "voting_weight",
                reason: "voter has no voting weight".into(),
            }
            .into());
        }

        let _guard = self.lock(id).await;
        let proposal = self.require(id).await?;
        let block = self.clock.block_number();
        if !proposal.voting_open_at(block) {
            return Err(GovernanceError::ProposalNotActive {
                id: *id,
                state: self.effective_state(&proposal).await?,
            });
        }

        let vote = Vote {
            proposal_id: *id,
            voter: voter.address,
            support,
            weight: voter.voting_weight,
            reason: reason.filter(|r| !r.trim().is_empty()),
            cast_at: self.clock.now(),
        };

        self.store
            .record_vote(vote.clone())
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => GovernanceError::DuplicateVote {
                    id: *id,
                    voter: voter.address,
                },
                StoreError::NotFound(_) => GovernanceError::ProposalNotFound(*id),
                other => other.into(),
            })?;

        tracing::info!(
            proposal_id = %id.short(),
            voter = %voter.address,
            support = ?support,
            weight = vote.weight,
            "vote cast"
        );
        self.events.publish(GovernanceEvent::VoteCast {
            id: *id,
            voter: voter.address,
            support,
            weight: vote.weight,
        });
        Ok(vote)
    }

    /// Effective state at the current block and time
    pub async fn state(&self, id: &ProposalId) -> Result<ProposalState> {
        let proposal = self.require(id).await?;
        self.effective_state(&proposal).await
    }

    /// Persist the outcome once voting has closed. Idempotent.
    pub async fn resolve(&self, id: &ProposalId) -> Result<ProposalState> {
        let _guard = self.lock(id).await;
        self.resolve_locked(id).await
    }

    /// Resolve if needed, then schedule the proposal on the timelock
    pub async fn queue(&self, id: &ProposalId) -> Result<TimelockEntry> {
        let _guard = self.lock(id).await;

        let proposal = self.require(id).await?;
        let state = match proposal.state {
            ProposalState::Pending | ProposalState::Active
                if !proposal.voting_ended_at(self.clock.block_number()) =>
            {
                self.effective_state(&proposal).await?
            }
            _ => self.resolve_locked(id).await?,
        };
        if state != ProposalState::Succeeded {
            return Err(GovernanceError::ProposalNotSucceeded { id: *id, state });
        }

        let params = self.params.get();
        let eta = add_secs(self.clock.now(), "timelock_delay_secs", params.timelock_delay_secs)?;
        let entry = self.gate.schedule(*id, eta).await?;

        if let Err(e) = self
            .store
            .transition(id, &[ProposalState::Succeeded], ProposalState::Queued, Some(eta))
            .await
        {
            // keep the gate consistent with the proposal
            if let Err(undo) = self.gate.cancel(id).await {
                tracing::error!(proposal_id = %id.short(), error = %undo, "failed to undo timelock entry");
            }
            return Err(e.into());
        }

        tracing::info!(proposal_id = %id.short(), eta = %eta, "proposal queued");
        self.events
            .publish(GovernanceEvent::ProposalQueued { id: *id, eta });
        Ok(entry)
    }

    /// Cancel a proposal that has not executed. Authorization is the
    /// caller's job.
    pub async fn cancel(&self, id: &ProposalId, by: &WalletAddress) -> Result<Proposal> {
        let _guard = self.lock(id).await;

        let proposal = self.require(id).await?;
        let state = self.effective_state(&proposal).await?;
        if !state.is_cancelable() {
            return Err(GovernanceError::ProposalFinalized { id: *id, state });
        }

        let canceled = self
            .store
            .transition(id, &[proposal.state], ProposalState::Canceled, None)
            .await?;

        if proposal.state == ProposalState::Queued {
            self.gate.cancel(id).await?;
        }

        tracing::info!(proposal_id = %id.short(), by = %by, "proposal canceled");
        self.events
            .publish(GovernanceEvent::ProposalCanceled { id: *id, by: *by });
        Ok(canceled)
    }

    /// Queued -> Executed. The caller must hold the proposal's lock and
    /// have applied the action.
    pub(crate) async fn mark_executed_locked(&self, id: &ProposalId) -> Result<Proposal> {
        let proposal = self
            .store
            .transition(id, &[ProposalState::Queued], ProposalState::Executed, None)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => GovernanceError::NotQueued(*id),
                other => other.into(),
            })?;
        self.events
            .publish(GovernanceEvent::ProposalExecuted { id: *id });
        Ok(proposal)
    }

    pub async fn get(&self, id: &ProposalId) -> Result<Option<Proposal>> {
        Ok(self.store.get(id).await?)
    }

    pub async fn require(&self, id: &ProposalId) -> Result<Proposal> {
        self.store
            .get(id)
            .await?
            .ok_or(GovernanceError::ProposalNotFound(*id))
    }

    pub async fn list(&self) -> Result<Vec<Proposal>> {
        Ok(self.store.list().await?)
    }

    pub async fn votes(&self, id: &ProposalId) -> Result<Vec<Vote>> {
        self.store.votes(id).await.map_err(|e| match e {
            StoreError::NotFound(_) => GovernanceError::ProposalNotFound(*id),
            other => other.into(),
        })
    }

    pub async fn vote_of(&self, id: &ProposalId, voter: &WalletAddress) -> Result<Option<Vote>> {
        Ok(self.store.get_vote(id, voter).await?)
    }

    async fn resolve_locked(&self, id: &ProposalId) -> Result<ProposalState> {
        let proposal = self.require(id).await?;

        if !matches!(proposal.state, ProposalState::Pending | ProposalState::Active) {
            return self.effective_state(&proposal).await;
        }
        if !proposal.voting_ended_at(self.clock.block_number()) {
            return Err(GovernanceError::VotingNotEnded {
                id: *id,
                end_block: proposal.end_block,
            });
        }

        let outcome = proposal.tally.outcome(self.params.get().quorum);
        self.store
            .transition(
                id,
                &[ProposalState::Pending, ProposalState::Active],
                outcome,
                None,
            )
            .await?;

        tracing::info!(
            proposal_id = %id.short(),
            state = %outcome,
            for_votes = proposal.tally.for_votes,
            against_votes = proposal.tally.against_votes,
            abstain_votes = proposal.tally.abstain_votes,
            "proposal resolved"
        );
        self.events
            .publish(GovernanceEvent::ProposalResolved { id: *id, state: outcome });
        Ok(outcome)
    }

    async fn effective_state(&self, proposal: &Proposal) -> Result<ProposalState> {
        let params = self.params.get();
        let now = self.clock.now();

        if proposal.state == ProposalState::Queued {
            // the entry's own deadline wins over the current grace period
            if let Some(entry) = self.gate.get(&proposal.id).await? {
                return Ok(if now > entry.grace_deadline {
                    ProposalState::Expired
                } else {
                    ProposalState::Queued
                });
            }
        }

        Ok(proposal.state_at(
            self.clock.block_number(),
            now,
            params.quorum,
            params.grace_period_secs,
        ))
    }
}
