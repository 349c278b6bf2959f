//! Account types
//!
//! Accounts are the identity records every caller is resolved to before an
//! operation is authorized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::address::WalletAddress;
use crate::error::AccredoError;

/// Role held by an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "student")]
    Student,
    #[serde(rename = "institute")]
    Institute,
    #[serde(rename = "employer")]
    Employer,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "dao-member")]
    DaoMember,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Student,
        Role::Institute,
        Role::Employer,
        Role::Admin,
        Role::DaoMember,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Institute => "institute",
            Role::Employer => "employer",
            Role::Admin => "admin",
            Role::DaoMember => "dao-member",
        }
    }

    /// Roles that only an admin may grant
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin | Role::DaoMember)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AccredoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "institute" => Ok(Role::Institute),
            "employer" => Ok(Role::Employer),
            "admin" => Ok(Role::Admin),
            "dao-member" | "dao_member" => Ok(Role::DaoMember),
            other => Err(AccredoError::InvalidRole(other.to_string())),
        }
    }
}

/// An identity record keyed by wallet address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Wallet address (unique key)
    pub address: WalletAddress,

    /// Role used for authorization
    pub role: Role,

    /// Human-readable name (institute name for issuers)
    pub display_name: String,

    /// Optional metadata document (institute profile, DAO charter)
    pub metadata_uri: Option<String>,

    /// Governance voting weight
    pub voting_weight: u64,

    /// Soft-deactivation flag; accounts are never deleted
    pub active: bool,

    /// Optimistic-concurrency version, bumped on every write
    #[serde(default)]
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(address: WalletAddress, role: Role, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            address,
            role,
            display_name: display_name.into(),
            metadata_uri: None,
            voting_weight: 1,
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_weight(mut self, weight: u64) -> Self {
        self.voting_weight = weight;
        self
    }

    pub fn with_metadata(mut self, uri: impl Into<String>) -> Self {
        self.metadata_uri = Some(uri.into());
        self
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_wire_name() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!(
            serde_json::to_string(&Role::DaoMember).unwrap(),
            "\"dao-member\""
        );
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!(matches!(
            "superuser".parse::<Role>(),
            Err(AccredoError::InvalidRole(_))
        ));
    }
}
