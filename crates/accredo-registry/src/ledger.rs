//! Credential ledger
//!
//! Local mirror of credential NFT issuance and revocation. Records are
//! written once at issuance and only ever gain a revocation stamp.

use accredo_core::{CredentialRecord, StoreError, TokenId, WalletAddress};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[async_trait::async_trait]
pub trait CredentialLedger: Send + Sync {
    /// Record a newly minted credential; `Duplicate` on a reused token id
    async fn record_issuance(&self, record: CredentialRecord) -> Result<CredentialRecord, StoreError>;

    /// Stamp a credential revoked; `NotFound`, or `Conflict` if it already is
    async fn record_revocation(
        &self,
        token_id: TokenId,
        by: WalletAddress,
        at: DateTime<Utc>,
    ) -> Result<CredentialRecord, StoreError>;

    async fn get(&self, token_id: TokenId) -> Result<Option<CredentialRecord>, StoreError>;

    async fn list_by_issuer(&self, issuer: &WalletAddress) -> Result<Vec<CredentialRecord>, StoreError>;

    async fn list_by_holder(&self, holder: &WalletAddress) -> Result<Vec<CredentialRecord>, StoreError>;

    /// Whether the issuer has any credential that is not revoked
    async fn issuer_has_outstanding_credentials(&self, issuer: &WalletAddress) -> Result<bool, StoreError>;
}

#[derive(Default)]
pub struct InMemoryCredentialLedger {
    credentials: RwLock<BTreeMap<TokenId, CredentialRecord>>,
}

impl InMemoryCredentialLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn filtered<F>(&self, predicate: F) -> Result<Vec<CredentialRecord>, StoreError>
    where
        F: Fn(&CredentialRecord) -> bool,
    {
        let credentials = self
            .credentials
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(credentials.values().filter(|c| predicate(c)).cloned().collect())
    }
}

#[async_trait::async_trait]
impl CredentialLedger for InMemoryCredentialLedger {
    async fn record_issuance(&self, record: CredentialRecord) -> Result<CredentialRecord, StoreError> {
        let mut credentials = self
            .credentials
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if credentials.contains_key(&record.token_id) {
            return Err(StoreError::Duplicate(record.token_id.to_string()));
        }
        credentials.insert(record.token_id, record.clone());
        Ok(record)
    }

    async fn record_revocation(
        &self,
        token_id: TokenId,
        by: WalletAddress,
        at: DateTime<Utc>,
    ) -> Result<CredentialRecord, StoreError> {
        let mut credentials = self
            .credentials
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let record = credentials
            .get_mut(&token_id)
            .ok_or_else(|| StoreError::NotFound(token_id.to_string()))?;

        if record.is_revoked() {
            return Err(StoreError::Conflict(format!("credential {token_id} already revoked")));
        }
        record.revoked_at = Some(at);
        record.revoked_by = Some(by);
        Ok(record.clone())
    }

    async fn get(&self, token_id: TokenId) -> Result<Option<CredentialRecord>, StoreError> {
        let credentials = self
            .credentials
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(credentials.get(&token_id).cloned())
    }

    async fn list_by_issuer(&self, issuer: &WalletAddress) -> Result<Vec<CredentialRecord>, StoreError> {
        self.filtered(|c| &c.issuer == issuer)
    }

    async fn list_by_holder(&self, holder: &WalletAddress) -> Result<Vec<CredentialRecord>, StoreError> {
        self.filtered(|c| &c.holder == holder)
    }

    async fn issuer_has_outstanding_credentials(&self, issuer: &WalletAddress) -> Result<bool, StoreError> {
        Ok(!self.filtered(|c| &c.issuer == issuer && !c.is_revoked())?.is_empty())
    }
}
