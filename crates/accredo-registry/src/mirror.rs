//! On-chain issuer role mirror
//!
//! Listens for accreditation changes and grants or revokes the issuer role
//! on the credential registry contract so that minting rights follow the
//! registry. Every outcome is written back as the record's [`ChainSync`].
//! A confirmation that times out is stored as `Unknown` and settled later by
//! [`RoleMirror::reconcile`], which only reads receipts.

use accredo_chain::{await_confirmation, ChainClient, RetryPolicy, RoleAction, TxOutcome, TxStatus};
use accredo_core::{ChainSync, GovernanceEvent, IssuerRecord, WalletAddress};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::registry::IssuerRegistry;
use crate::Result;

#[derive(Clone)]
pub struct RoleMirror {
    registry: IssuerRegistry,
    chain: Arc<dyn ChainClient>,
    retry: RetryPolicy,
    poll_interval: Duration,
    confirmation_timeout: Duration,
}

impl RoleMirror {
    pub fn new(registry: IssuerRegistry, chain: Arc<dyn ChainClient>) -> Self {
        Self {
            registry,
            chain,
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_confirmation(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.confirmation_timeout = timeout;
        self
    }

    /// Bring the on-chain role for `address` in line with its record
    pub async fn sync(&self, address: &WalletAddress) -> Result<IssuerRecord> {
        let record = self.registry.require(address).await?;

        if let Some(tx_hash) = record.chain_sync.unresolved_tx() {
            // An earlier transaction may still land; settle it before
            // sending anything new.
            tracing::debug!(address = %address, tx_hash, "settling unresolved role transaction first");
            self.settle(address, tx_hash).await?;
        }

        let action = if record.is_eligible() {
            RoleAction::Grant
        } else {
            RoleAction::Revoke
        };

        let sent = self
            .retry
            .run("eth_sendTransaction", || self.chain.send_role_tx(action, address))
            .await;

        let tx_hash = match sent {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                tracing::error!(address = %address, %action, error = %e, "role transaction not submitted");
                return self
                    .registry
                    .record_chain_sync(address, ChainSync::Failed { reason: e.to_string() })
                    .await;
            }
        };

        self.registry
            .record_chain_sync(address, ChainSync::Pending { tx_hash: tx_hash.clone() })
            .await?;

        let outcome = await_confirmation(
            self.chain.as_ref(),
            &tx_hash,
            &self.retry,
            self.poll_interval,
            self.confirmation_timeout,
        )
        .await;

        let sync = match outcome {
            TxOutcome::Confirmed { block } => {
                tracing::info!(address = %address, %action, tx_hash = %tx_hash, block, "issuer role mirrored");
                ChainSync::Confirmed { tx_hash, block }
            }
            TxOutcome::Reverted { block } => {
                tracing::error!(address = %address, %action, tx_hash = %tx_hash, block, "role transaction reverted");
                ChainSync::Failed {
                    reason: format!("transaction {tx_hash} reverted in block {block}"),
                }
            }
            TxOutcome::Unknown => ChainSync::Unknown { tx_hash },
        };

        self.registry.record_chain_sync(address, sync).await
    }

    /// Query receipts for every pending or unknown transaction.
    /// Returns how many records were settled.
    pub async fn reconcile(&self) -> Result<usize> {
        let mut settled = 0;
        for record in self.registry.list().await? {
            if let Some(tx_hash) = record.chain_sync.unresolved_tx() {
                if self.settle(&record.address, tx_hash).await? {
                    settled += 1;
                }
            }
        }
        Ok(settled)
    }

    async fn settle(&self, address: &WalletAddress, tx_hash: &str) -> Result<bool> {
        let status = match self.retry.run("eth_getTransactionReceipt", || self.chain.tx_status(tx_hash)).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(address = %address, tx_hash, error = %e, "receipt lookup failed");
                return Ok(false);
            }
        };

        let sync = match status {
            TxStatus::Pending => return Ok(false),
            TxStatus::Mined { block } => ChainSync::Confirmed {
                tx_hash: tx_hash.to_string(),
                block,
            },
            TxStatus::Reverted { block } => ChainSync::Failed {
                reason: format!("transaction {tx_hash} reverted in block {block}"),
            },
        };

        tracing::info!(address = %address, tx_hash, "reconciled role transaction");
        self.registry.record_chain_sync(address, sync).await?;
        Ok(true)
    }

    /// Follow accreditation changes until the bus closes
    pub async fn run(self, mut events: broadcast::Receiver<GovernanceEvent>) {
        loop {
            match events.recv().await {
                Ok(GovernanceEvent::AccreditationChanged { address, .. }) => {
                    if let Err(e) = self.sync(&address).await {
                        tracing::error!(address = %address, error = %e, "role mirror failed");
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Missed events; fall back to a full pass over the registry.
                    tracing::warn!(skipped, "role mirror lagged, resyncing all issuers");
                    if let Err(e) = self.resync_all().await {
                        tracing::error!(error = %e, "role mirror resync failed");
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::info!("role mirror stopped");
    }

    async fn resync_all(&self) -> Result<()> {
        for record in self.registry.list().await? {
            if record.accredited || record.suspended || !matches!(record.chain_sync, ChainSync::NotSynced) {
                self.sync(&record.address).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accredo_chain::InMemoryChain;
    use accredo_core::EventBus;

    fn addr(b: u8) -> WalletAddress {
        WalletAddress::from_bytes([b; 20])
    }

    fn fast(mirror: RoleMirror) -> RoleMirror {
        mirror
            .with_retry(RetryPolicy::immediate(3))
            .with_confirmation(Duration::from_millis(5), Duration::from_millis(40))
    }

    #[tokio::test]
    async fn test_grant_and_revoke_follow_accreditation() {
        let registry = IssuerRegistry::in_memory(EventBus::default());
        let chain = Arc::new(InMemoryChain::new());
        let mirror = fast(RoleMirror::new(registry.clone(), chain.clone()));
        let uni = addr(0x21);

        registry.register_issuer(uni, "Uni", None).await.unwrap();
        registry.accredit_issuer(&uni).await.unwrap();
        let record = mirror.sync(&uni).await.unwrap();
        assert!(matches!(record.chain_sync, ChainSync::Confirmed { .. }));
        assert!(chain.has_role(&uni));

        registry.suspend_issuer(&uni, "fraud").await.unwrap();
        mirror.sync(&uni).await.unwrap();
        assert!(!chain.has_role(&uni));
    }

    #[tokio::test]
    async fn test_transient_send_failures_are_retried() {
        let registry = IssuerRegistry::in_memory(EventBus::default());
        let chain = Arc::new(InMemoryChain::new());
        let mirror = fast(RoleMirror::new(registry.clone(), chain.clone()));
        let uni = addr(0x22);
        registry.register_issuer(uni, "Uni", None).await.unwrap();
        registry.accredit_issuer(&uni).await.unwrap();

        chain.fail_next_sends(2);
        let record = mirror.sync(&uni).await.unwrap();
        assert!(matches!(record.chain_sync, ChainSync::Confirmed { .. }));

        chain.fail_next_sends(5);
        let record = mirror.sync(&uni).await.unwrap();
        assert!(matches!(record.chain_sync, ChainSync::Failed { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_reconciled_not_resent() {
        let registry = IssuerRegistry::in_memory(EventBus::default());
        let chain = Arc::new(InMemoryChain::new().with_auto_mine(false));
        let mirror = fast(RoleMirror::new(registry.clone(), chain.clone()));
        let uni = addr(0x23);
        registry.register_issuer(uni, "Uni", None).await.unwrap();
        registry.accredit_issuer(&uni).await.unwrap();

        let record = mirror.sync(&uni).await.unwrap();
        assert!(matches!(record.chain_sync, ChainSync::Unknown { .. }));

        assert_eq!(mirror.reconcile().await.unwrap(), 0);
        chain.mine();
        assert_eq!(mirror.reconcile().await.unwrap(), 1);

        let record = registry.require(&uni).await.unwrap();
        assert!(matches!(record.chain_sync, ChainSync::Confirmed { .. }));
        assert_eq!(chain.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_run_follows_events() {
        let events = EventBus::default();
        let registry = IssuerRegistry::in_memory(events.clone());
        let chain = Arc::new(InMemoryChain::new());
        let mirror = fast(RoleMirror::new(registry.clone(), chain.clone()));
        let handle = tokio::spawn(mirror.run(events.subscribe()));

        let uni = addr(0x24);
        registry.register_issuer(uni, "Uni", None).await.unwrap();
        registry.accredit_issuer(&uni).await.unwrap();

        for _ in 0..50 {
            if chain.has_role(&uni) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(chain.has_role(&uni));

        drop(registry);
        drop(events);
        handle.abort();
    }
}
