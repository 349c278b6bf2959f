//! Time and block height sources

use accredo_core::StoreError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

use crate::store::ParameterStore;

/// Wall clock plus a block height
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn block_number(&self) -> u64;
}

/// Real time, with block heights derived from a genesis instant and a
/// fixed block interval
#[derive(Debug, Clone)]
pub struct SystemClock {
    genesis: DateTime<Utc>,
    block_time_secs: u64,
}

impl SystemClock {
    pub fn new(genesis: DateTime<Utc>, block_time_secs: u64) -> Self {
        Self {
            genesis,
            block_time_secs: block_time_secs.max(1),
        }
    }

    /// Block zero is the moment of construction
    pub fn starting_now(block_time_secs: u64) -> Self {
        Self::new(Utc::now(), block_time_secs)
    }

    /// Clock whose block zero is the genesis recorded in `store`, so heights
    /// keep increasing across restarts. The first start records its own
    /// time. A stored block interval wins over `default_block_time_secs`.
    pub async fn anchored(
        store: &dyn ParameterStore,
        default_block_time_secs: u64,
    ) -> Result<Self, StoreError> {
        let genesis = store.genesis(Utc::now()).await?;
        let block_time_secs = store
            .load()
            .await?
            .map_or(default_block_time_secs, |p| p.block_time_secs);
        tracing::info!(%genesis, block_time_secs, "governance clock anchored");
        Ok(Self::new(genesis, block_time_secs))
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn block_number(&self) -> u64 {
        let elapsed = (Utc::now() - self.genesis).num_seconds().max(0) as u64;
        elapsed / self.block_time_secs
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<(DateTime<Utc>, u64)>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>, block: u64) -> Self {
        Self {
            state: Mutex::new((now, block)),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now(), 0)
    }

    pub fn advance_secs(&self, secs: i64) {
        if let Ok(mut state) = self.state.lock() {
            state.0 += Duration::seconds(secs);
        }
    }

    pub fn advance_blocks(&self, blocks: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.1 += blocks;
        }
    }

    pub fn set(&self, now: DateTime<Utc>, block: u64) {
        if let Ok(mut state) = self.state.lock() {
            *state = (now, block);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state
            .lock()
            .map(|state| state.0)
            .unwrap_or_else(|poisoned| poisoned.into_inner().0)
    }

    fn block_number(&self) -> u64 {
        self.state
            .lock()
            .map(|state| state.1)
            .unwrap_or_else(|poisoned| poisoned.into_inner().1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_derives_blocks() {
        let clock = SystemClock::new(Utc::now() - Duration::seconds(120), 12);
        let block = clock.block_number();
        assert!((10..=11).contains(&block));
    }

    #[tokio::test]
    async fn test_anchored_clock_survives_restart() {
        use crate::store::InMemoryParameterStore;
        use accredo_core::GovernanceParams;

        let store = InMemoryParameterStore::new();
        store
            .genesis(Utc::now() - Duration::seconds(600))
            .await
            .unwrap();
        store
            .save(&GovernanceParams {
                block_time_secs: 60,
                ..GovernanceParams::default()
            })
            .await
            .unwrap();

        // the configured interval is ignored once params are stored
        let first = SystemClock::anchored(&store, 12).await.unwrap();
        assert!((9..=10).contains(&first.block_number()));

        let second = SystemClock::anchored(&store, 12).await.unwrap();
        assert!(second.block_number() >= first.block_number());
        assert!(SystemClock::starting_now(60).block_number() < first.block_number());
    }

    #[test]
    fn test_manual_clock_moves_on_request() {
        let start = Utc::now();
        let clock = ManualClock::new(start, 5);
        clock.advance_blocks(3);
        clock.advance_secs(60);
        assert_eq!(clock.block_number(), 8);
        assert_eq!(clock.now(), start + Duration::seconds(60));
    }
}
