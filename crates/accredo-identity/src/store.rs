//! Account storage

use accredo_core::{Account, AccredoError, GovernanceEvent, EventBus, Role, StoreError, WalletAddress};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{IdentityError, Result};

/// Attempts before an optimistic update gives up under contention
const MAX_CAS_ATTEMPTS: usize = 8;

/// Trait for account storage backends
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account; fails with `Duplicate` if the address exists
    async fn insert(&self, account: Account) -> std::result::Result<Account, StoreError>;

    async fn get(&self, address: &WalletAddress) -> std::result::Result<Option<Account>, StoreError>;

    async fn list(&self) -> std::result::Result<Vec<Account>, StoreError>;

    /// Replace the stored account if its version still equals
    /// `expected_version`. The stored copy gets `expected_version + 1`.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        next: Account,
    ) -> std::result::Result<Account, StoreError>;
}

/// In-memory account store (for development/testing)
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<WalletAddress, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert(&self, account: Account) -> std::result::Result<Account, StoreError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if accounts.contains_key(&account.address) {
            return Err(StoreError::Duplicate(account.address.to_string()));
        }
        accounts.insert(account.address, account.clone());
        Ok(account)
    }

    async fn get(&self, address: &WalletAddress) -> std::result::Result<Option<Account>, StoreError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(accounts.get(address).cloned())
    }

    async fn list(&self) -> std::result::Result<Vec<Account>, StoreError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by_key(|a| a.created_at);
        Ok(all)
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut next: Account,
    ) -> std::result::Result<Account, StoreError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let current = accounts
            .get_mut(&next.address)
            .ok_or_else(|| StoreError::NotFound(next.address.to_string()))?;

        if current.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "account {} is at version {}, expected {}",
                next.address, current.version, expected_version
            )));
        }

        next.version = expected_version + 1;
        next.updated_at = Utc::now();
        *current = next.clone();
        Ok(next)
    }
}

/// Identity Store service: account lifecycle on top of an [`AccountStore`]
#[derive(Clone)]
pub struct IdentityStore {
    store: Arc<dyn AccountStore>,
    events: EventBus,
}

impl IdentityStore {
    pub fn new(store: Arc<dyn AccountStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    pub fn in_memory(events: EventBus) -> Self {
        Self::new(Arc::new(InMemoryAccountStore::new()), events)
    }

    /// Create an account. Names must be non-empty.
    pub async fn register_account(&self, account: Account) -> Result<Account> {
        if account.display_name.trim().is_empty() {
            return Err(AccredoError::InvalidField {
                field: "display_name",
                reason: "must not be empty".into(),
            }
            .into());
        }

        let address = account.address;
        let role = account.role;
        let stored = self.store.insert(account).await.map_err(|e| match e {
            StoreError::Duplicate(_) => IdentityError::DuplicateAccount(address),
            other => other.into(),
        })?;

        tracing::info!(address = %address, role = %role, "account registered");
        self.events
            .publish(GovernanceEvent::AccountRegistered { address, role });
        Ok(stored)
    }

    pub async fn get(&self, address: &WalletAddress) -> Result<Option<Account>> {
        Ok(self.store.get(address).await?)
    }

    pub async fn require(&self, address: &WalletAddress) -> Result<Account> {
        self.get(address)
            .await?
            .ok_or(IdentityError::AccountNotFound(*address))
    }

    /// Look up an account and fail unless it is active
    pub async fn require_active(&self, address: &WalletAddress) -> Result<Account> {
        let account = self.require(address).await?;
        if !account.active {
            return Err(IdentityError::AccountInactive(*address));
        }
        Ok(account)
    }

    pub async fn list(&self) -> Result<Vec<Account>> {
        Ok(self.store.list().await?)
    }

    pub async fn deactivate(&self, address: &WalletAddress) -> Result<Account> {
        self.set_active(address, false).await
    }

    pub async fn reactivate(&self, address: &WalletAddress) -> Result<Account> {
        self.set_active(address, true).await
    }

    async fn set_active(&self, address: &WalletAddress, active: bool) -> Result<Account> {
        let account = self
            .update(address, |account| {
                account.active = active;
                Ok(())
            })
            .await?;

        tracing::info!(address = %address, active, "account activation changed");
        self.events.publish(GovernanceEvent::AccountActivationChanged {
            address: *address,
            active,
        });
        Ok(account)
    }

    pub async fn set_weight(&self, address: &WalletAddress, weight: u64) -> Result<Account> {
        self.update(address, |account| {
            account.voting_weight = weight;
            Ok(())
        })
        .await
    }

    pub async fn set_role(&self, address: &WalletAddress, role: Role) -> Result<Account> {
        self.update(address, |account| {
            account.role = role;
            Ok(())
        })
        .await
    }

    pub async fn update_profile(
        &self,
        address: &WalletAddress,
        display_name: Option<String>,
        metadata_uri: Option<String>,
    ) -> Result<Account> {
        self.update(address, move |account| {
            if let Some(name) = &display_name {
                if name.trim().is_empty() {
                    return Err(AccredoError::InvalidField {
                        field: "display_name",
                        reason: "must not be empty".into(),
                    }
                    .into());
                }
                account.display_name = name.clone();
            }
            if let Some(uri) = &metadata_uri {
                account.metadata_uri = Some(uri.clone());
            }
            Ok(())
        })
        .await
    }

    /// Read-modify-write with optimistic concurrency, retried on conflict
    async fn update<F>(&self, address: &WalletAddress, mutate: F) -> Result<Account>
    where
        F: Fn(&mut Account) -> Result<()> + Send + Sync,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.require(address).await?;
            let mut next = current.clone();
            mutate(&mut next)?;

            match self.store.compare_and_swap(current.version, next).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::Conflict(reason)) => {
                    tracing::debug!(address = %address, %reason, "account update conflict, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IdentityError::Storage(format!(
            "account {address} kept changing; gave up after {MAX_CAS_ATTEMPTS} attempts"
        )))
    }
}
