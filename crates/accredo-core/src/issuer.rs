//! Issuer types for Accredo
//!
//! An issuer is an institute allowed to mint credentials once the DAO has
//! accredited it. Records are never deleted, only state-flagged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::WalletAddress;

/// Derived lifecycle state of an issuer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuerState {
    Unregistered,
    Registered,
    Accredited,
    Suspended,
}

impl IssuerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuerState::Unregistered => "unregistered",
            IssuerState::Registered => "registered",
            IssuerState::Accredited => "accredited",
            IssuerState::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for IssuerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the on-chain role grant mirroring this record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainSync {
    /// No role transaction has been submitted yet
    #[default]
    NotSynced,
    /// Submitted, awaiting confirmation
    Pending { tx_hash: String },
    /// Mined successfully
    Confirmed { tx_hash: String, block: u64 },
    /// Confirmation timed out; needs a status query before anything else
    Unknown { tx_hash: String },
    /// Submission failed or the transaction reverted
    Failed { reason: String },
}

impl ChainSync {
    /// Transaction awaiting reconciliation, if any
    pub fn unresolved_tx(&self) -> Option<&str> {
        match self {
            ChainSync::Pending { tx_hash } | ChainSync::Unknown { tx_hash } => Some(tx_hash),
            _ => None,
        }
    }
}

/// Issuer registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerRecord {
    /// Wallet address (key)
    pub address: WalletAddress,

    /// Display name
    pub name: String,

    pub registered: bool,
    pub accredited: bool,
    pub suspended: bool,

    /// Why the issuer was suspended
    pub suspension_reason: Option<String>,

    /// Institute metadata document
    pub metadata_uri: Option<String>,

    /// Mirror of the on-chain issuer role
    #[serde(default)]
    pub chain_sync: ChainSync,

    /// Optimistic-concurrency version, bumped on every write
    #[serde(default)]
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IssuerRecord {
    /// A freshly registered, not yet accredited issuer
    pub fn registered(
        address: WalletAddress,
        name: impl Into<String>,
        metadata_uri: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            address,
            name: name.into(),
            registered: true,
            accredited: false,
            suspended: false,
            suspension_reason: None,
            metadata_uri,
            chain_sync: ChainSync::NotSynced,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> IssuerState {
        match (self.registered, self.accredited, self.suspended) {
            (false, _, _) => IssuerState::Unregistered,
            (true, _, true) => IssuerState::Suspended,
            (true, true, false) => IssuerState::Accredited,
            (true, false, false) => IssuerState::Registered,
        }
    }

    /// Registered, accredited and not suspended
    pub fn is_eligible(&self) -> bool {
        self.registered && self.accredited && !self.suspended
    }

    /// `accredited => registered`, `suspended => registered`, never both
    pub fn invariants_hold(&self) -> bool {
        (!self.accredited || self.registered)
            && (!self.suspended || self.registered)
            && !(self.accredited && self.suspended)
    }
}
