//! Issuer lifecycle manager
//!
//! ```text
//! Unregistered -> Registered -> Accredited <-> Suspended
//!                     ^              |              |
//!                     +--- revoke ---+--------------+
//! ```
//!
//! Every mutation is a versioned read-modify-write against the
//! [`IssuerStore`], retried when a concurrent writer got there first, and
//! publishes an event once committed. Suspension and issuance also hold a
//! per-issuer lock, because each decides from the other's store.

use accredo_core::{
    ChainSync, CredentialRecord, EventBus, GovernanceEvent, IssuerRecord, IssuerState, KeyedLocks,
    StoreError, TokenId, WalletAddress,
};
use chrono::Utc;
use std::sync::Arc;

use crate::ledger::{CredentialLedger, InMemoryCredentialLedger};
use crate::store::{InMemoryIssuerStore, IssuerStore};
use crate::{RegistryError, Result, SuspensionPolicy};

const MAX_CAS_ATTEMPTS: usize = 8;

#[derive(Clone)]
pub struct IssuerRegistry {
    store: Arc<dyn IssuerStore>,
    ledger: Arc<dyn CredentialLedger>,
    events: EventBus,
    suspension_policy: SuspensionPolicy,
    locks: Arc<KeyedLocks<WalletAddress>>,
}

impl IssuerRegistry {
    pub fn new(
        store: Arc<dyn IssuerStore>,
        ledger: Arc<dyn CredentialLedger>,
        events: EventBus,
        suspension_policy: SuspensionPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            events,
            suspension_policy,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn in_memory(events: EventBus) -> Self {
        Self::new(
            Arc::new(InMemoryIssuerStore::new()),
            Arc::new(InMemoryCredentialLedger::new()),
            events,
            SuspensionPolicy::default(),
        )
    }

    pub fn with_suspension_policy(mut self, policy: SuspensionPolicy) -> Self {
        self.suspension_policy = policy;
        self
    }

    pub fn suspension_policy(&self) -> SuspensionPolicy {
        self.suspension_policy
    }

    pub async fn register_issuer(
        &self,
        address: WalletAddress,
        name: &str,
        metadata_uri: Option<String>,
    ) -> Result<IssuerRecord> {
        if name.trim().is_empty() {
            return Err(accredo_core::AccredoError::InvalidField {
                field: "name",
                reason: "must not be empty".into(),
            }
            .into());
        }

        let record = IssuerRecord::registered(address, name.trim(), metadata_uri);
        let stored = self.store.insert(record).await.map_err(|e| match e {
            StoreError::Duplicate(_) => RegistryError::DuplicateIssuer(address),
            other => other.into(),
        })?;

        tracing::info!(address = %address, name = %stored.name, "issuer registered");
        self.events
            .publish(GovernanceEvent::IssuerRegistered { address });
        Ok(stored)
    }

    /// Registered or Suspended -> Accredited
    pub async fn accredit_issuer(&self, address: &WalletAddress) -> Result<IssuerRecord> {
        let record = self
            .update(address, |record| {
                if record.accredited {
                    return Err(RegistryError::AlreadyAccredited(record.address));
                }
                record.accredited = true;
                record.suspended = false;
                record.suspension_reason = None;
                Ok(())
            })
            .await?;

        self.announce(&record);
        Ok(record)
    }

    /// Accredited -> Suspended. Issued credentials stay valid.
    pub async fn suspend_issuer(&self, address: &WalletAddress, reason: &str) -> Result<IssuerRecord> {
        // no issuance for this issuer can land between the check and the update
        let _guard = self.locks.lock(address).await;
        if self.suspension_policy == SuspensionPolicy::BlockWhileOutstanding
            && self.ledger.issuer_has_outstanding_credentials(address).await?
        {
            return Err(RegistryError::OutstandingCredentials(*address));
        }

        let reason = reason.trim().to_string();
        let record = self
            .update(address, |record| {
                if !record.accredited {
                    return Err(RegistryError::NotAccredited(record.address));
                }
                record.accredited = false;
                record.suspended = true;
                record.suspension_reason = Some(reason.clone()).filter(|r| !r.is_empty());
                Ok(())
            })
            .await?;

        self.announce(&record);
        Ok(record)
    }

    /// Accredited or Suspended -> Registered
    pub async fn revoke_accreditation(&self, address: &WalletAddress) -> Result<IssuerRecord> {
        let record = self
            .update(address, |record| {
                if !record.accredited && !record.suspended {
                    return Err(RegistryError::NotAccredited(record.address));
                }
                record.accredited = false;
                record.suspended = false;
                record.suspension_reason = None;
                Ok(())
            })
            .await?;

        self.announce(&record);
        Ok(record)
    }

    pub async fn is_eligible_issuer(&self, address: &WalletAddress) -> Result<bool> {
        Ok(self
            .store
            .get(address)
            .await?
            .map(|r| r.is_eligible())
            .unwrap_or(false))
    }

    pub async fn get(&self, address: &WalletAddress) -> Result<Option<IssuerRecord>> {
        Ok(self.store.get(address).await?)
    }

    pub async fn require(&self, address: &WalletAddress) -> Result<IssuerRecord> {
        self.get(address)
            .await?
            .ok_or(RegistryError::NotRegistered(*address))
    }

    pub async fn list(&self) -> Result<Vec<IssuerRecord>> {
        Ok(self.store.list().await?)
    }

    pub async fn state_of(&self, address: &WalletAddress) -> Result<IssuerState> {
        Ok(self
            .get(address)
            .await?
            .map(|r| r.state())
            .unwrap_or(IssuerState::Unregistered))
    }

    /// Store the outcome of mirroring the role on chain. Publishes nothing.
    pub async fn record_chain_sync(&self, address: &WalletAddress, sync: ChainSync) -> Result<IssuerRecord> {
        self.update(address, |record| {
            record.chain_sync = sync.clone();
            Ok(())
        })
        .await
    }

    /// Mirror a minted credential. The issuer must be eligible right now.
    pub async fn record_issuance(
        &self,
        token_id: TokenId,
        issuer: WalletAddress,
        holder: WalletAddress,
        metadata_uri: Option<String>,
    ) -> Result<CredentialRecord> {
        let _guard = self.locks.lock(&issuer).await;
        if !self.is_eligible_issuer(&issuer).await? {
            return Err(RegistryError::IneligibleIssuer(issuer));
        }

        let record = CredentialRecord::issued(token_id, issuer, holder, metadata_uri);
        let stored = self.ledger.record_issuance(record).await.map_err(|e| match e {
            StoreError::Duplicate(_) => RegistryError::DuplicateCredential(token_id),
            other => other.into(),
        })?;

        tracing::info!(token_id = %token_id, issuer = %issuer, holder = %holder, "credential issued");
        self.events.publish(GovernanceEvent::CredentialIssued {
            token_id,
            issuer,
            holder,
        });
        Ok(stored)
    }

    pub async fn record_revocation(&self, token_id: TokenId, by: WalletAddress) -> Result<CredentialRecord> {
        let record = self
            .ledger
            .record_revocation(token_id, by, Utc::now())
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => RegistryError::CredentialNotFound(token_id),
                StoreError::Conflict(_) => RegistryError::CredentialAlreadyRevoked(token_id),
                other => other.into(),
            })?;

        tracing::info!(token_id = %token_id, by = %by, "credential revoked");
        self.events
            .publish(GovernanceEvent::CredentialRevoked { token_id, by });
        Ok(record)
    }

    pub async fn credential(&self, token_id: TokenId) -> Result<CredentialRecord> {
        self.ledger
            .get(token_id)
            .await?
            .ok_or(RegistryError::CredentialNotFound(token_id))
    }

    pub async fn credentials_by_issuer(&self, issuer: &WalletAddress) -> Result<Vec<CredentialRecord>> {
        Ok(self.ledger.list_by_issuer(issuer).await?)
    }

    pub async fn credentials_by_holder(&self, holder: &WalletAddress) -> Result<Vec<CredentialRecord>> {
        Ok(self.ledger.list_by_holder(holder).await?)
    }

    fn announce(&self, record: &IssuerRecord) {
        let state = record.state();
        tracing::info!(address = %record.address, state = %state, "accreditation changed");
        self.events.publish(GovernanceEvent::AccreditationChanged {
            address: record.address,
            state,
        });
    }

    async fn update<F>(&self, address: &WalletAddress, mutate: F) -> Result<IssuerRecord>
    where
        F: Fn(&mut IssuerRecord) -> Result<()> + Send + Sync,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.require(address).await?;
            let mut next = current.clone();
            mutate(&mut next)?;
            debug_assert!(next.invariants_hold(), "issuer flags out of order: {next:?}");

            match self.store.compare_and_swap(current.version, next).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::Conflict(reason)) => {
                    tracing::debug!(address = %address, %reason, "issuer update conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::Storage(format!(
            "issuer {address} kept changing; gave up after {MAX_CAS_ATTEMPTS} attempts"
        )))
    }
}
