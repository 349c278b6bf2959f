//! Issuer record storage

use accredo_core::{IssuerRecord, StoreError, WalletAddress};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

/// Trait for issuer storage backends
#[async_trait::async_trait]
pub trait IssuerStore: Send + Sync {
    /// Insert a new record; `Duplicate` if the address is taken
    async fn insert(&self, record: IssuerRecord) -> Result<IssuerRecord, StoreError>;

    async fn get(&self, address: &WalletAddress) -> Result<Option<IssuerRecord>, StoreError>;

    async fn list(&self) -> Result<Vec<IssuerRecord>, StoreError>;

    /// Versioned write; `Conflict` if the stored version moved on
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        next: IssuerRecord,
    ) -> Result<IssuerRecord, StoreError>;
}

/// In-memory issuer store (for development/testing)
#[derive(Default)]
pub struct InMemoryIssuerStore {
    issuers: RwLock<HashMap<WalletAddress, IssuerRecord>>,
}

impl InMemoryIssuerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl IssuerStore for InMemoryIssuerStore {
    async fn insert(&self, record: IssuerRecord) -> Result<IssuerRecord, StoreError> {
        let mut issuers = self
            .issuers
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if issuers.contains_key(&record.address) {
            return Err(StoreError::Duplicate(record.address.to_string()));
        }
        issuers.insert(record.address, record.clone());
        Ok(record)
    }

    async fn get(&self, address: &WalletAddress) -> Result<Option<IssuerRecord>, StoreError> {
        let issuers = self
            .issuers
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(issuers.get(address).cloned())
    }

    async fn list(&self) -> Result<Vec<IssuerRecord>, StoreError> {
        let issuers = self
            .issuers
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut all: Vec<_> = issuers.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut next: IssuerRecord,
    ) -> Result<IssuerRecord, StoreError> {
        let mut issuers = self
            .issuers
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let current = issuers
            .get_mut(&next.address)
            .ok_or_else(|| StoreError::NotFound(next.address.to_string()))?;

        if current.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "issuer {} is at version {}, expected {}",
                next.address, current.version, expected_version
            )));
        }

        next.version = expected_version + 1;
        next.updated_at = Utc::now();
        *current = next.clone();
        Ok(next)
    }
}
