//! Central authorization policy
//!
//! Every state-changing operation is named by an [`Operation`] and mapped to
//! the roles allowed to perform it. Callers are always resolved to their
//! stored account first; roles carried anywhere else are ignored.

use accredo_core::{Account, Role, WalletAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::store::IdentityStore;
use crate::{IdentityError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ManageAccounts,
    RegisterIssuer,
    AccreditIssuer,
    SuspendIssuer,
    RevokeIssuer,
    CreateProposal,
    CastVote,
    ResolveProposal,
    QueueProposal,
    ExecuteProposal,
    CancelProposal,
    IssueCredential,
    RevokeCredential,
    ViewAudit,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ManageAccounts => "manage_accounts",
            Operation::RegisterIssuer => "register_issuer",
            Operation::AccreditIssuer => "accredit_issuer",
            Operation::SuspendIssuer => "suspend_issuer",
            Operation::RevokeIssuer => "revoke_issuer",
            Operation::CreateProposal => "create_proposal",
            Operation::CastVote => "cast_vote",
            Operation::ResolveProposal => "resolve_proposal",
            Operation::QueueProposal => "queue_proposal",
            Operation::ExecuteProposal => "execute_proposal",
            Operation::CancelProposal => "cancel_proposal",
            Operation::IssueCredential => "issue_credential",
            Operation::RevokeCredential => "revoke_credential",
            Operation::ViewAudit => "view_audit",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation -> allowed roles
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    rules: HashMap<Operation, Vec<Role>>,
}

impl AuthorizationPolicy {
    /// A policy with no rules; every operation is denied
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn allow(mut self, operation: Operation, roles: &[Role]) -> Self {
        self.rules.insert(operation, roles.to_vec());
        self
    }

    pub fn allowed_roles(&self, operation: Operation) -> &[Role] {
        self.rules
            .get(&operation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn permits(&self, role: Role, operation: Operation) -> bool {
        self.allowed_roles(operation).contains(&role)
    }
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        use Role::*;

        let governance = [Admin, DaoMember];
        Self::empty()
            .allow(Operation::ManageAccounts, &[Admin])
            .allow(Operation::RegisterIssuer, &[Institute, Admin])
            .allow(Operation::AccreditIssuer, &[Admin])
            .allow(Operation::SuspendIssuer, &[Admin])
            .allow(Operation::RevokeIssuer, &[Admin])
            .allow(Operation::CreateProposal, &governance)
            .allow(Operation::CastVote, &governance)
            .allow(Operation::ResolveProposal, &governance)
            .allow(Operation::QueueProposal, &governance)
            .allow(Operation::ExecuteProposal, &governance)
            .allow(Operation::CancelProposal, &[Admin])
            .allow(Operation::IssueCredential, &[Institute, Admin])
            .allow(Operation::RevokeCredential, &[Institute, Admin])
            .allow(Operation::ViewAudit, &[Admin])
    }
}

/// Checks callers against an [`AuthorizationPolicy`]
#[derive(Clone)]
pub struct Authorizer {
    identity: IdentityStore,
    policy: std::sync::Arc<AuthorizationPolicy>,
}

impl Authorizer {
    pub fn new(identity: IdentityStore, policy: AuthorizationPolicy) -> Self {
        Self {
            identity,
            policy: std::sync::Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    /// Resolve the caller's active account and check its role
    pub async fn authorize(&self, caller: &WalletAddress, operation: Operation) -> Result<Account> {
        let account = self.identity.require_active(caller).await?;

        if !self.policy.permits(account.role, operation) {
            tracing::warn!(
                caller = %caller,
                role = %account.role,
                operation = %operation,
                "authorization denied"
            );
            return Err(IdentityError::Forbidden {
                operation,
                role: account.role,
            });
        }

        Ok(account)
    }

    /// Like [`authorize`](Self::authorize), but the owner of the resource
    /// passes regardless of role
    pub async fn authorize_owner_or(
        &self,
        caller: &WalletAddress,
        owner: &WalletAddress,
        operation: Operation,
    ) -> Result<Account> {
        let account = self.identity.require_active(caller).await?;
        if caller == owner || self.policy.permits(account.role, operation) {
            return Ok(account);
        }

        Err(IdentityError::Forbidden {
            operation,
            role: account.role,
        })
    }

    /// Account creation: anyone may register their own address with a
    /// non-privileged role; everything else needs `ManageAccounts`.
    pub async fn authorize_registration(
        &self,
        caller: &WalletAddress,
        address: &WalletAddress,
        role: Role,
    ) -> Result<()> {
        if caller == address && !role.is_privileged() {
            return Ok(());
        }

        match self.authorize(caller, Operation::ManageAccounts).await {
            Ok(_) => Ok(()),
            Err(IdentityError::AccountNotFound(_)) | Err(IdentityError::Forbidden { .. })
                if role.is_privileged() =>
            {
                Err(IdentityError::PrivilegedRole(role))
            }
            Err(e) => Err(e),
        }
    }
}
