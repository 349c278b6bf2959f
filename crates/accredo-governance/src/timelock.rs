//! Timelock gate
//!
//! A queued proposal may execute only inside `[eta, eta + grace_period]`,
//! and `eta` itself must respect the minimum delay.

use accredo_core::params::add_secs;
use accredo_core::{ProposalId, StoreError, TimelockEntry, TimelockStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::params::SharedParams;
use crate::store::TimelockStore;
use crate::{GovernanceError, Result};

#[derive(Clone)]
pub struct TimelockGate {
    store: Arc<dyn TimelockStore>,
    params: SharedParams,
    clock: Arc<dyn Clock>,
}

impl TimelockGate {
    pub fn new(store: Arc<dyn TimelockStore>, params: SharedParams, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            params,
            clock,
        }
    }

    pub async fn schedule(&self, id: ProposalId, eta: DateTime<Utc>) -> Result<TimelockEntry> {
        let params = self.params.get();
        let now = self.clock.now();
        let earliest = add_secs(now, "minimum_delay_secs", params.minimum_delay_secs)?;
        if eta < earliest {
            return Err(GovernanceError::InvalidEta { eta, earliest });
        }

        let entry = TimelockEntry::new(id, eta, params.grace_period_secs, now)?;
        let entry = self.store.insert(entry).await.map_err(|e| match e {
            StoreError::Duplicate(_) => GovernanceError::AlreadyScheduled(id),
            other => other.into(),
        })?;

        tracing::info!(proposal_id = %id.short(), eta = %entry.eta, "timelock scheduled");
        Ok(entry)
    }

    pub async fn get(&self, id: &ProposalId) -> Result<Option<TimelockEntry>> {
        Ok(self.store.get(id).await?)
    }

    /// The scheduled entry, if `now` is inside its window
    pub async fn check_executable(&self, id: &ProposalId) -> Result<TimelockEntry> {
        let entry = self
            .store
            .get(id)
            .await?
            .filter(|e| e.status == TimelockStatus::Scheduled)
            .ok_or(GovernanceError::NotQueued(*id))?;

        let now = self.clock.now();
        if now < entry.eta {
            return Err(GovernanceError::TooEarly {
                id: *id,
                eta: entry.eta,
            });
        }
        if now > entry.grace_deadline {
            return Err(GovernanceError::Expired(*id));
        }
        Ok(entry)
    }

    /// Claim the entry for execution. Only one caller can win the claim.
    pub async fn mark_executed(&self, id: &ProposalId) -> Result<TimelockEntry> {
        self.finish(id, TimelockStatus::Executed).await
    }

    /// Undo a claim whose action failed, so the proposal can be retried
    pub async fn release(&self, id: &ProposalId) -> Result<TimelockEntry> {
        let entry = self
            .store
            .set_status(id, TimelockStatus::Executed, TimelockStatus::Scheduled)
            .await?;
        tracing::info!(proposal_id = %id.short(), "timelock claim released");
        Ok(entry)
    }

    pub async fn cancel(&self, id: &ProposalId) -> Result<TimelockEntry> {
        self.finish(id, TimelockStatus::Canceled).await
    }

    async fn finish(&self, id: &ProposalId, status: TimelockStatus) -> Result<TimelockEntry> {
        let entry = self
            .store
            .set_status(id, TimelockStatus::Scheduled, status)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) | StoreError::Conflict(_) => GovernanceError::NotQueued(*id),
                other => other.into(),
            })?;
        tracing::info!(proposal_id = %id.short(), status = status.as_str(), "timelock entry closed");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::InMemoryTimelockStore;
    use accredo_core::GovernanceParams;
    use chrono::Duration;

    fn gate() -> (TimelockGate, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let params = SharedParams::new(GovernanceParams {
            timelock_delay_secs: 100,
            minimum_delay_secs: 100,
            grace_period_secs: 50,
            ..GovernanceParams::default()
        });
        let gate = TimelockGate::new(Arc::new(InMemoryTimelockStore::new()), params, clock.clone());
        (gate, clock)
    }

    #[tokio::test]
    async fn test_eta_must_respect_minimum_delay() {
        let (gate, clock) = gate();
        let id = ProposalId::from_bytes([1u8; 32]);

        let err = gate
            .schedule(id, clock.now() + Duration::seconds(99))
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidEta { .. }));

        gate.schedule(id, clock.now() + Duration::seconds(100))
            .await
            .unwrap();
        assert!(matches!(
            gate.schedule(id, clock.now() + Duration::seconds(200)).await,
            Err(GovernanceError::AlreadyScheduled(_))
        ));
    }

    #[tokio::test]
    async fn test_execution_window_boundaries() {
        let (gate, clock) = gate();
        let id = ProposalId::from_bytes([2u8; 32]);
        gate.schedule(id, clock.now() + Duration::seconds(100))
            .await
            .unwrap();

        clock.advance_secs(99);
        assert!(matches!(
            gate.check_executable(&id).await,
            Err(GovernanceError::TooEarly { .. })
        ));

        clock.advance_secs(1);
        assert!(gate.check_executable(&id).await.is_ok());

        clock.advance_secs(50);
        assert!(gate.check_executable(&id).await.is_ok());

        clock.advance_secs(1);
        assert!(matches!(
            gate.check_executable(&id).await,
            Err(GovernanceError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn test_entries_close_once() {
        let (gate, clock) = gate();
        let id = ProposalId::from_bytes([3u8; 32]);
        gate.schedule(id, clock.now() + Duration::seconds(100))
            .await
            .unwrap();

        gate.mark_executed(&id).await.unwrap();
        gate.release(&id).await.unwrap();
        assert!(gate.release(&id).await.is_err());

        gate.mark_executed(&id).await.unwrap();
        assert!(matches!(
            gate.mark_executed(&id).await,
            Err(GovernanceError::NotQueued(_))
        ));
        assert!(matches!(
            gate.check_executable(&id).await,
            Err(GovernanceError::NotQueued(_))
        ));
        assert!(matches!(
            gate.cancel(&ProposalId::from_bytes([4u8; 32])).await,
            Err(GovernanceError::NotQueued(_))
        ));
    }
}
