//! Credential ledger records
//!
//! Credentials themselves are NFTs minted on chain. The ledger keeps a
//! local mirror of issuance and revocation events keyed by token id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::WalletAddress;

/// On-chain token identifier of a credential NFT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TokenId {
    type Err = crate::error::AccredoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TokenId)
            .map_err(|e| crate::error::AccredoError::InvalidField {
                field: "token_id",
                reason: e.to_string(),
            })
    }
}

/// Mirror of a credential's issuance and revocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub token_id: TokenId,
    pub issuer: WalletAddress,
    pub holder: WalletAddress,
    pub metadata_uri: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<WalletAddress>,
}

impl CredentialRecord {
    pub fn issued(
        token_id: TokenId,
        issuer: WalletAddress,
        holder: WalletAddress,
        metadata_uri: Option<String>,
    ) -> Self {
        Self {
            token_id,
            issuer,
            holder,
            metadata_uri,
            issued_at: Utc::now(),
            revoked_at: None,
            revoked_by: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}
