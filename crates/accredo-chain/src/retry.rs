//! Retry with exponential backoff, and confirmation polling.
//!
//! Only errors that report themselves retryable are retried. A confirmation
//! that does not arrive within the timeout is reported as
//! [`TxOutcome::Unknown`]; the transaction must then be reconciled by
//! querying its receipt, never by sending it again.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::{ChainClient, Result, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// No sleeping between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based): 200ms, 400ms, 800ms, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        "chain call failed, retrying in {delay:?}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Final answer about a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TxOutcome {
    Confirmed { block: u64 },
    Reverted { block: u64 },
    /// No receipt within the timeout
    Unknown,
}

/// Poll the receipt of `tx_hash` until it is mined or `timeout` passes.
///
/// Individual polls go through `retry`; a poll that still fails after its
/// retries ends the wait with [`TxOutcome::Unknown`].
pub async fn await_confirmation(
    client: &dyn ChainClient,
    tx_hash: &str,
    retry: &RetryPolicy,
    poll_interval: Duration,
    timeout: Duration,
) -> TxOutcome {
    let poll = async {
        loop {
            match retry.run("eth_getTransactionReceipt", || client.tx_status(tx_hash)).await {
                Ok(TxStatus::Mined { block }) => return TxOutcome::Confirmed { block },
                Ok(TxStatus::Reverted { block }) => return TxOutcome::Reverted { block },
                Ok(TxStatus::Pending) => tokio::time::sleep(poll_interval).await,
                Err(e) => {
                    tracing::warn!(tx_hash, error = %e, "receipt polling failed");
                    return TxOutcome::Unknown;
                }
            }
        }
    };

    match tokio::time::timeout(timeout, poll).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(tx_hash, ?timeout, "transaction not confirmed in time");
            TxOutcome::Unknown
        }
    }
}
