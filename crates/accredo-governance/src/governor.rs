//! Governor
//!
//! The single entry point for callers. Each operation resolves the caller
//! to an active account, checks it against the authorization policy, and
//! then delegates to the identity store, issuer registry, proposal engine or
//! timelock gate. Proposal execution happens here because it is the one
//! step that reaches across all of them.

use accredo_core::{
    Account, CredentialRecord, EventBus, GovernanceEvent, GovernanceParams, IssuerRecord, Proposal,
    ProposalAction, ProposalId, ProposalState, Role, TimelockEntry, TimelockStatus, TokenId, Vote,
    VoteSupport, WalletAddress,
};
use accredo_identity::{
    AccountStore, AuthorizationPolicy, Authorizer, IdentityError, IdentityStore,
    InMemoryAccountStore, Operation,
};
use accredo_registry::{
    CredentialLedger, InMemoryCredentialLedger, InMemoryIssuerStore, IssuerRegistry, IssuerStore,
    SuspensionPolicy,
};
use std::sync::Arc;

use crate::audit::{AuditEntry, AuditSink, InMemoryAuditLog};
use crate::clock::Clock;
use crate::params::SharedParams;
use crate::proposal::ProposalEngine;
use crate::store::{
    InMemoryParameterStore, InMemoryProposalStore, InMemoryTimelockStore, ParameterStore,
    ProposalStore, TimelockStore,
};
use crate::timelock::TimelockGate;
use crate::{GovernanceError, Result};

/// Storage backends for every component
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub issuers: Arc<dyn IssuerStore>,
    pub credentials: Arc<dyn CredentialLedger>,
    pub proposals: Arc<dyn ProposalStore>,
    pub timelock: Arc<dyn TimelockStore>,
    pub parameters: Arc<dyn ParameterStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(InMemoryAccountStore::new()),
            issuers: Arc::new(InMemoryIssuerStore::new()),
            credentials: Arc::new(InMemoryCredentialLedger::new()),
            proposals: Arc::new(InMemoryProposalStore::new()),
            timelock: Arc::new(InMemoryTimelockStore::new()),
            parameters: Arc::new(InMemoryParameterStore::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
        }
    }
}

#[derive(Clone)]
pub struct Governor {
    identity: IdentityStore,
    authorizer: Authorizer,
    registry: IssuerRegistry,
    engine: ProposalEngine,
    params: SharedParams,
    parameters: Arc<dyn ParameterStore>,
    audit: Arc<dyn AuditSink>,
    events: EventBus,
}

impl Governor {
    /// Wire the components together. Parameters persisted by an earlier
    /// `UpdateParameters` execution take precedence over `defaults`.
    pub async fn open(
        stores: Stores,
        defaults: GovernanceParams,
        suspension_policy: SuspensionPolicy,
        policy: AuthorizationPolicy,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Result<Self> {
        let params = match stores.parameters.load().await? {
            Some(stored) => {
                stored.validate()?;
                tracing::info!("using governance parameters from storage");
                stored
            }
            None => {
                defaults.validate()?;
                stores.parameters.save(&defaults).await?;
                defaults
            }
        };
        let params = SharedParams::new(params);

        let identity = IdentityStore::new(stores.accounts, events.clone());
        let authorizer = Authorizer::new(identity.clone(), policy);
        let registry = IssuerRegistry::new(
            stores.issuers,
            stores.credentials,
            events.clone(),
            suspension_policy,
        );
        let gate = TimelockGate::new(stores.timelock, params.clone(), clock.clone());
        let engine = ProposalEngine::new(stores.proposals, gate, params.clone(), clock, events.clone());

        Ok(Self {
            identity,
            authorizer,
            registry,
            engine,
            params,
            parameters: stores.parameters,
            audit: stores.audit,
            events,
        })
    }

    pub async fn in_memory(defaults: GovernanceParams, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open(
            Stores::in_memory(),
            defaults,
            SuspensionPolicy::default(),
            AuthorizationPolicy::default(),
            clock,
            EventBus::default(),
        )
        .await
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    pub fn registry(&self) -> &IssuerRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &ProposalEngine {
        &self.engine
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        self.audit.clone()
    }

    pub fn params(&self) -> GovernanceParams {
        self.params.get()
    }

    /// Check `caller` against `operation` without doing anything
    pub async fn authorize(&self, caller: &WalletAddress, operation: Operation) -> Result<Account> {
        Ok(self.authorizer.authorize(caller, operation).await?)
    }

    /// Ensure a configured administrator account exists. Runs without a
    /// caller, at startup only.
    pub async fn bootstrap_admin(&self, address: WalletAddress, display_name: &str) -> Result<Account> {
        match self.identity.get(&address).await? {
            Some(account) => {
                if account.role != Role::Admin {
                    tracing::warn!(address = %address, role = %account.role, "bootstrap admin exists with another role");
                }
                Ok(account)
            }
            None => {
                let account = self
                    .identity
                    .register_account(Account::new(address, Role::Admin, display_name))
                    .await?;
                tracing::info!(address = %address, "bootstrap admin created");
                Ok(account)
            }
        }
    }

    // Accounts

    pub async fn register_account(
        &self,
        caller: &WalletAddress,
        mut account: Account,
        voting_weight: Option<u64>,
    ) -> Result<Account> {
        self.authorizer
            .authorize_registration(caller, &account.address, account.role)
            .await?;
        if let Some(weight) = voting_weight {
            self.authorizer
                .authorize(caller, Operation::ManageAccounts)
                .await?;
            account.voting_weight = weight;
        }
        Ok(self.identity.register_account(account).await?)
    }

    pub async fn account(&self, address: &WalletAddress) -> Result<Account> {
        Ok(self.identity.require(address).await?)
    }

    pub async fn deactivate_account(&self, caller: &WalletAddress, address: &WalletAddress) -> Result<Account> {
        self.authorizer
            .authorize(caller, Operation::ManageAccounts)
            .await?;
        Ok(self.identity.deactivate(address).await?)
    }

    pub async fn reactivate_account(&self, caller: &WalletAddress, address: &WalletAddress) -> Result<Account> {
        self.authorizer
            .authorize(caller, Operation::ManageAccounts)
            .await?;
        Ok(self.identity.reactivate(address).await?)
    }

    pub async fn set_voting_weight(
        &self,
        caller: &WalletAddress,
        address: &WalletAddress,
        weight: u64,
    ) -> Result<Account> {
        self.authorizer
            .authorize(caller, Operation::ManageAccounts)
            .await?;
        Ok(self.identity.set_weight(address, weight).await?)
    }

    // Issuers

    /// Institutes register themselves; admins may register any address
    pub async fn register_issuer(
        &self,
        caller: &WalletAddress,
        address: WalletAddress,
        name: &str,
        metadata_uri: Option<String>,
    ) -> Result<IssuerRecord> {
        let account = self
            .authorizer
            .authorize(caller, Operation::RegisterIssuer)
            .await?;
        if account.role != Role::Admin && address != *caller {
            return Err(IdentityError::Forbidden {
                operation: Operation::RegisterIssuer,
                role: account.role,
            }
            .into());
        }
        Ok(self
            .registry
            .register_issuer(address, name, metadata_uri)
            .await?)
    }

    pub async fn accredit_issuer(&self, caller: &WalletAddress, address: &WalletAddress) -> Result<IssuerRecord> {
        self.authorizer
            .authorize(caller, Operation::AccreditIssuer)
            .await?;
        Ok(self.registry.accredit_issuer(address).await?)
    }

    pub async fn suspend_issuer(
        &self,
        caller: &WalletAddress,
        address: &WalletAddress,
        reason: &str,
    ) -> Result<IssuerRecord> {
        self.authorizer
            .authorize(caller, Operation::SuspendIssuer)
            .await?;
        Ok(self.registry.suspend_issuer(address, reason).await?)
    }

    pub async fn revoke_issuer(&self, caller: &WalletAddress, address: &WalletAddress) -> Result<IssuerRecord> {
        self.authorizer
            .authorize(caller, Operation::RevokeIssuer)
            .await?;
        Ok(self.registry.revoke_accreditation(address).await?)
    }

    // Credentials

    /// Mirror a minted credential. Institutes record their own issuance;
    /// admins name the issuer explicitly.
    pub async fn issue_credential(
        &self,
        caller: &WalletAddress,
        token_id: TokenId,
        issuer: Option<WalletAddress>,
        holder: WalletAddress,
        metadata_uri: Option<String>,
    ) -> Result<CredentialRecord> {
        let account = self
            .authorizer
            .authorize(caller, Operation::IssueCredential)
            .await?;

        let issuer = issuer.unwrap_or(*caller);
        if account.role != Role::Admin && issuer != *caller {
            return Err(IdentityError::Forbidden {
                operation: Operation::IssueCredential,
                role: account.role,
            }
            .into());
        }

        Ok(self
            .registry
            .record_issuance(token_id, issuer, holder, metadata_uri)
            .await?)
    }

    /// Only the issuing institute or an admin may revoke
    pub async fn revoke_credential(&self, caller: &WalletAddress, token_id: TokenId) -> Result<CredentialRecord> {
        let account = self
            .authorizer
            .authorize(caller, Operation::RevokeCredential)
            .await?;
        let record = self.registry.credential(token_id).await?;
        if account.role != Role::Admin && record.issuer != *caller {
            return Err(IdentityError::Forbidden {
                operation: Operation::RevokeCredential,
                role: account.role,
            }
            .into());
        }
        Ok(self.registry.record_revocation(token_id, *caller).await?)
    }

    // Proposals

    pub async fn create_proposal(
        &self,
        caller: &WalletAddress,
        action: ProposalAction,
        target: Option<WalletAddress>,
        description: &str,
    ) -> Result<Proposal> {
        let proposer = self
            .authorizer
            .authorize(caller, Operation::CreateProposal)
            .await?;
        self.engine
            .create_proposal(&proposer, action, target, description)
            .await
    }

    /// Vote with the weight stored on the caller's account
    pub async fn cast_vote(
        &self,
        caller: &WalletAddress,
        id: &ProposalId,
        support: VoteSupport,
        reason: Option<String>,
    ) -> Result<Vote> {
        let voter = self
            .authorizer
            .authorize(caller, Operation::CastVote)
            .await?;
        self.engine.cast_vote(id, &voter, support, reason).await
    }

    pub async fn resolve(&self, caller: &WalletAddress, id: &ProposalId) -> Result<ProposalState> {
        self.authorizer
            .authorize(caller, Operation::ResolveProposal)
            .await?;
        self.engine.resolve(id).await
    }

    pub async fn queue(&self, caller: &WalletAddress, id: &ProposalId) -> Result<TimelockEntry> {
        self.authorizer
            .authorize(caller, Operation::QueueProposal)
            .await?;
        self.engine.queue(id).await
    }

    /// Apply a queued proposal inside its timelock window.
    ///
    /// The timelock entry is claimed before the action runs and released if
    /// the action fails. If recording the execution fails afterwards, calling
    /// again finishes the bookkeeping without applying the action twice.
    pub async fn execute(&self, caller: &WalletAddress, id: &ProposalId) -> Result<Proposal> {
        self.authorizer
            .authorize(caller, Operation::ExecuteProposal)
            .await?;

        let _guard = self.engine.lock(id).await;
        let proposal = self.engine.require(id).await?;
        if proposal.state != ProposalState::Queued {
            return Err(GovernanceError::NotQueued(*id));
        }

        // A claimed entry on a queued proposal means the action already ran
        // but the execution was never recorded.
        let gate = self.engine.gate();
        let entry = gate.get(id).await?.ok_or(GovernanceError::NotQueued(*id))?;
        match entry.status {
            TimelockStatus::Canceled => return Err(GovernanceError::NotQueued(*id)),
            TimelockStatus::Executed => {
                tracing::warn!(proposal_id = %id.short(), "action already applied; recording execution");
            }
            TimelockStatus::Scheduled => {
                gate.check_executable(id).await?;
                gate.mark_executed(id).await?;
                if let Err(e) = self.apply(&proposal).await {
                    tracing::error!(proposal_id = %id.short(), error = %e, "proposal action failed; left queued");
                    if let Err(undo) = gate.release(id).await {
                        tracing::error!(proposal_id = %id.short(), error = %undo, "failed to release timelock claim");
                    }
                    return Err(e);
                }
            }
        }

        let executed = self.engine.mark_executed_locked(id).await.map_err(|e| {
            tracing::error!(proposal_id = %id.short(), error = %e, "action applied but not recorded; execute again");
            e
        })?;
        tracing::info!(
            proposal_id = %id.short(),
            kind = %proposal.action.kind(),
            executed_by = %caller,
            "proposal executed"
        );
        Ok(executed)
    }

    /// Admins, or the proposer, may cancel until execution
    pub async fn cancel(&self, caller: &WalletAddress, id: &ProposalId) -> Result<Proposal> {
        let proposal = self.engine.require(id).await?;
        self.authorizer
            .authorize_owner_or(caller, &proposal.proposer, Operation::CancelProposal)
            .await?;
        self.engine.cancel(id, caller).await
    }

    pub async fn proposal(&self, id: &ProposalId) -> Result<(Proposal, ProposalState)> {
        let proposal = self.engine.require(id).await?;
        let state = self.engine.state(id).await?;
        Ok((proposal, state))
    }

    pub async fn audit_log(&self, caller: &WalletAddress, limit: usize) -> Result<Vec<AuditEntry>> {
        self.authorizer.authorize(caller, Operation::ViewAudit).await?;
        Ok(self.audit.recent(limit).await?)
    }

    async fn apply(&self, proposal: &Proposal) -> Result<()> {
        let target = proposal.target;
        match &proposal.action {
            ProposalAction::AccreditIssuer => {
                let target = target.ok_or(GovernanceError::MissingTarget)?;
                self.ensure_registered(&target).await?;
                self.registry.accredit_issuer(&target).await?;
            }
            ProposalAction::SuspendIssuer { reason } => {
                let target = target.ok_or(GovernanceError::MissingTarget)?;
                self.registry.suspend_issuer(&target, reason).await?;
            }
            ProposalAction::RevokeIssuer => {
                let target = target.ok_or(GovernanceError::MissingTarget)?;
                self.registry.revoke_accreditation(&target).await?;
            }
            ProposalAction::UpdateParameters { update } => {
                let next = self.params.get().apply(update)?;
                self.parameters.save(&next).await?;
                self.params.replace(next.clone());
                tracing::info!(?update, "governance parameters updated");
                self.events
                    .publish(GovernanceEvent::ParametersUpdated { params: next });
            }
        }
        Ok(())
    }

    /// An accreditation vote may name an institute that never registered as
    /// an issuer; register it from its account first.
    async fn ensure_registered(&self, target: &WalletAddress) -> Result<()> {
        if self.registry.get(target).await?.is_some() {
            return Ok(());
        }

        let account = self.identity.require(target).await?;
        tracing::info!(address = %target, "registering issuer ahead of accreditation");
        self.registry
            .register_issuer(*target, &account.display_name, account.metadata_uri.clone())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use accredo_core::{AccredoError, ErrorKind, IssuerState, ParameterUpdate, StoreError};
    use accredo_registry::RegistryError;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    const ADMIN: u8 = 0x01;
    const UNI: u8 = 0x10;
    const STUDENT: u8 = 0x20;

    fn addr(b: u8) -> WalletAddress {
        WalletAddress::from_bytes([b; 20])
    }

    fn params() -> GovernanceParams {
        GovernanceParams {
            voting_delay_blocks: 1,
            voting_period_blocks: 10,
            quorum: 3,
            proposal_threshold: 1,
            timelock_delay_secs: 100,
            minimum_delay_secs: 100,
            grace_period_secs: 50,
            block_time_secs: 12,
        }
    }

    async fn setup(members: &[(u8, u64)]) -> (Governor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let gov = setup_with(Stores::in_memory(), clock.clone(), members).await;
        (gov, clock)
    }

    async fn open(stores: Stores, clock: Arc<dyn Clock>) -> Governor {
        Governor::open(
            stores,
            params(),
            SuspensionPolicy::default(),
            AuthorizationPolicy::default(),
            clock,
            EventBus::default(),
        )
        .await
        .unwrap()
    }

    async fn setup_with(stores: Stores, clock: Arc<dyn Clock>, members: &[(u8, u64)]) -> Governor {
        let gov = open(stores, clock).await;
        gov.bootstrap_admin(addr(ADMIN), "Root").await.unwrap();
        for (b, weight) in members {
            gov.register_account(
                &addr(ADMIN),
                Account::new(addr(*b), Role::DaoMember, "member"),
                Some(*weight),
            )
            .await
            .unwrap();
        }
        gov
    }

    /// Timelock store whose status writes fail while `fail` is set
    #[derive(Default)]
    struct FlakyTimelock {
        inner: InMemoryTimelockStore,
        fail: AtomicBool,
    }

    #[async_trait::async_trait]
    impl TimelockStore for FlakyTimelock {
        async fn insert(&self, entry: TimelockEntry) -> std::result::Result<TimelockEntry, StoreError> {
            self.inner.insert(entry).await
        }

        async fn get(&self, id: &ProposalId) -> std::result::Result<Option<TimelockEntry>, StoreError> {
            self.inner.get(id).await
        }

        async fn set_status(
            &self,
            id: &ProposalId,
            expected: TimelockStatus,
            next: TimelockStatus,
        ) -> std::result::Result<TimelockEntry, StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("connection reset".into()));
            }
            self.inner.set_status(id, expected, next).await
        }
    }

    /// Proposal store that cannot record executions while `fail` is set
    #[derive(Default)]
    struct FlakyProposals {
        inner: InMemoryProposalStore,
        fail: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ProposalStore for FlakyProposals {
        async fn insert(&self, proposal: Proposal) -> std::result::Result<Proposal, StoreError> {
            self.inner.insert(proposal).await
        }

        async fn get(&self, id: &ProposalId) -> std::result::Result<Option<Proposal>, StoreError> {
            self.inner.get(id).await
        }

        async fn list(&self) -> std::result::Result<Vec<Proposal>, StoreError> {
            self.inner.list().await
        }

        async fn record_vote(&self, vote: Vote) -> std::result::Result<Proposal, StoreError> {
            self.inner.record_vote(vote).await
        }

        async fn get_vote(&self, id: &ProposalId, voter: &WalletAddress) -> std::result::Result<Option<Vote>, StoreError> {
            self.inner.get_vote(id, voter).await
        }

        async fn votes(&self, id: &ProposalId) -> std::result::Result<Vec<Vote>, StoreError> {
            self.inner.votes(id).await
        }

        async fn transition(
            &self,
            id: &ProposalId,
            from: &[ProposalState],
            to: ProposalState,
            eta: Option<DateTime<Utc>>,
        ) -> std::result::Result<Proposal, StoreError> {
            if to == ProposalState::Executed && self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("connection reset".into()));
            }
            self.inner.transition(id, from, to, eta).await
        }
    }

    async fn register_institute(gov: &Governor) {
        gov.register_account(
            &addr(UNI),
            Account::new(addr(UNI), Role::Institute, "Tech Institute"),
            None,
        )
        .await
        .unwrap();
    }

    /// Create, pass and queue a proposal with the given members voting For
    async fn pass(
        gov: &Governor,
        clock: &ManualClock,
        action: ProposalAction,
        target: Option<WalletAddress>,
        voters: &[u8],
    ) -> ProposalId {
        let p = gov
            .create_proposal(&addr(voters[0]), action, target, "proposal")
            .await
            .unwrap();
        clock.advance_blocks(1);
        for v in voters {
            gov.cast_vote(&addr(*v), &p.id, VoteSupport::For, None)
                .await
                .unwrap();
        }
        clock.advance_blocks(11);
        gov.queue(&addr(voters[0]), &p.id).await.unwrap();
        p.id
    }

    #[tokio::test]
    async fn test_registration_to_issuance() {
        let (gov, _) = setup(&[]).await;

        gov.register_account(
            &addr(UNI),
            Account::new(addr(UNI), Role::Institute, "State University"),
            None,
        )
        .await
        .unwrap();
        gov.register_issuer(&addr(UNI), addr(UNI), "State University", None)
            .await
            .unwrap();
        gov.accredit_issuer(&addr(ADMIN), &addr(UNI)).await.unwrap();
        assert!(gov.registry().is_eligible_issuer(&addr(UNI)).await.unwrap());

        let record = gov
            .issue_credential(&addr(UNI), TokenId(1), None, addr(STUDENT), None)
            .await
            .unwrap();
        assert_eq!(record.issuer, addr(UNI));
    }

    #[tokio::test]
    async fn test_roles_come_from_the_store() {
        let (gov, _) = setup(&[]).await;
        gov.register_account(
            &addr(UNI),
            Account::new(addr(UNI), Role::Institute, "Uni"),
            None,
        )
        .await
        .unwrap();

        let err = gov
            .accredit_issuer(&addr(UNI), &addr(UNI))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), accredo_core::ErrorKind::Authorization);

        let err = gov
            .register_issuer(&addr(UNI), addr(0x77), "Someone else", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Identity(IdentityError::Forbidden { .. })));

        gov.register_account(
            &addr(0x30),
            Account::new(addr(0x30), Role::Student, "Bob"),
            None,
        )
        .await
        .unwrap();
        let err = gov
            .set_voting_weight(&addr(0x30), &addr(0x30), 100)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), accredo_core::ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn test_dao_accredits_unregistered_institute() {
        let (gov, clock) = setup(&[(0x41, 2), (0x42, 2)]).await;
        gov.register_account(
            &addr(UNI),
            Account::new(addr(UNI), Role::Institute, "Tech Institute").with_metadata("ipfs://tech"),
            None,
        )
        .await
        .unwrap();

        let id = pass(&gov, &clock, ProposalAction::AccreditIssuer, Some(addr(UNI)), &[0x41, 0x42]).await;

        assert!(matches!(
            gov.execute(&addr(0x41), &id).await,
            Err(GovernanceError::TooEarly { .. })
        ));
        clock.advance_secs(100);
        let executed = gov.execute(&addr(0x41), &id).await.unwrap();
        assert_eq!(executed.state, ProposalState::Executed);

        let issuer = gov.registry().require(&addr(UNI)).await.unwrap();
        assert_eq!(issuer.state(), IssuerState::Accredited);
        assert_eq!(issuer.name, "Tech Institute");
        assert_eq!(issuer.metadata_uri.as_deref(), Some("ipfs://tech"));

        assert!(matches!(
            gov.execute(&addr(0x41), &id).await,
            Err(GovernanceError::NotQueued(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_action_leaves_proposal_queued() {
        let (gov, clock) = setup(&[(0x41, 3)]).await;

        // target has neither an issuer record nor an account
        let id = pass(&gov, &clock, ProposalAction::AccreditIssuer, Some(addr(0x99)), &[0x41]).await;
        clock.advance_secs(100);

        let err = gov.execute(&addr(0x41), &id).await.unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::Identity(IdentityError::AccountNotFound(_))
        ));
        let (proposal, state) = gov.proposal(&id).await.unwrap();
        assert_eq!(proposal.state, ProposalState::Queued);
        assert_eq!(state, ProposalState::Queued);
        assert!(gov.engine().gate().check_executable(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_suspension_by_vote_blocks_new_issuance() {
        let (gov, clock) = setup(&[(0x41, 3)]).await;
        gov.register_account(&addr(UNI), Account::new(addr(UNI), Role::Institute, "Uni"), None)
            .await
            .unwrap();
        gov.register_issuer(&addr(UNI), addr(UNI), "Uni", None)
            .await
            .unwrap();
        gov.accredit_issuer(&addr(ADMIN), &addr(UNI)).await.unwrap();
        gov.issue_credential(&addr(UNI), TokenId(1), None, addr(STUDENT), None)
            .await
            .unwrap();

        let id = pass(
            &gov,
            &clock,
            ProposalAction::SuspendIssuer {
                reason: "fraud".into(),
            },
            Some(addr(UNI)),
            &[0x41],
        )
        .await;
        clock.advance_secs(100);
        gov.execute(&addr(0x41), &id).await.unwrap();

        let err = gov
            .issue_credential(&addr(UNI), TokenId(2), None, addr(STUDENT), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::Registry(RegistryError::IneligibleIssuer(_))
        ));
        assert!(!gov.registry().credential(TokenId(1)).await.unwrap().is_revoked());
    }

    #[tokio::test]
    async fn test_parameter_update_applies_on_execution() {
        let (gov, clock) = setup(&[(0x41, 3)]).await;
        let update = ParameterUpdate {
            quorum: Some(7),
            ..ParameterUpdate::default()
        };
        let id = pass(
            &gov,
            &clock,
            ProposalAction::UpdateParameters { update },
            None,
            &[0x41],
        )
        .await;
        assert_eq!(gov.params().quorum, 3);

        clock.advance_secs(100);
        gov.execute(&addr(0x41), &id).await.unwrap();
        assert_eq!(gov.params().quorum, 7);
        assert_eq!(gov.parameters.load().await.unwrap().unwrap().quorum, 7);
    }

    #[tokio::test]
    async fn test_failed_claim_applies_nothing() {
        let timelock = Arc::new(FlakyTimelock::default());
        let stores = Stores {
            timelock: timelock.clone(),
            ..Stores::in_memory()
        };
        let clock = Arc::new(ManualClock::starting_now());
        let gov = setup_with(stores, clock.clone(), &[(0x41, 3)]).await;
        register_institute(&gov).await;

        let id = pass(&gov, &clock, ProposalAction::AccreditIssuer, Some(addr(UNI)), &[0x41]).await;
        clock.advance_secs(100);

        timelock.fail.store(true, Ordering::SeqCst);
        let err = gov.execute(&addr(0x41), &id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalDependency);
        assert!(gov.registry().get(&addr(UNI)).await.unwrap().is_none());
        assert_eq!(gov.proposal(&id).await.unwrap().0.state, ProposalState::Queued);

        timelock.fail.store(false, Ordering::SeqCst);
        let executed = gov.execute(&addr(0x41), &id).await.unwrap();
        assert_eq!(executed.state, ProposalState::Executed);
        assert_eq!(
            gov.registry().require(&addr(UNI)).await.unwrap().state(),
            IssuerState::Accredited
        );
    }

    #[tokio::test]
    async fn test_unrecorded_execution_completes_on_retry() {
        let proposals = Arc::new(FlakyProposals::default());
        let stores = Stores {
            proposals: proposals.clone(),
            ..Stores::in_memory()
        };
        let clock = Arc::new(ManualClock::starting_now());
        let gov = setup_with(stores, clock.clone(), &[(0x41, 3)]).await;
        register_institute(&gov).await;

        let id = pass(&gov, &clock, ProposalAction::AccreditIssuer, Some(addr(UNI)), &[0x41]).await;
        clock.advance_secs(100);

        proposals.fail.store(true, Ordering::SeqCst);
        let err = gov.execute(&addr(0x41), &id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalDependency);

        // the action ran and the claim holds, but the proposal is still queued
        assert_eq!(
            gov.registry().require(&addr(UNI)).await.unwrap().state(),
            IssuerState::Accredited
        );
        let entry = gov.engine().gate().get(&id).await.unwrap().unwrap();
        assert_eq!(entry.status, TimelockStatus::Executed);
        assert_eq!(gov.proposal(&id).await.unwrap().0.state, ProposalState::Queued);

        // accrediting twice would fail, so success here means it was not reapplied
        proposals.fail.store(false, Ordering::SeqCst);
        let executed = gov.execute(&addr(0x41), &id).await.unwrap();
        assert_eq!(executed.state, ProposalState::Executed);
        assert!(matches!(
            gov.execute(&addr(0x41), &id).await,
            Err(GovernanceError::NotQueued(_))
        ));
    }

    #[tokio::test]
    async fn test_restart_keeps_block_heights() {
        let stores = Stores::in_memory();
        let genesis = Utc::now() - Duration::hours(1);
        stores.parameters.genesis(genesis).await.unwrap();

        // first run: ten minutes after genesis, 50 blocks of 12s
        let clock = Arc::new(ManualClock::new(genesis + Duration::minutes(10), 50));
        let gov = setup_with(stores.clone(), clock.clone(), &[(0x41, 3), (0x42, 1)]).await;
        let p = gov
            .create_proposal(&addr(0x41), ProposalAction::RevokeIssuer, Some(addr(UNI)), "x")
            .await
            .unwrap();
        clock.advance_blocks(1);
        gov.cast_vote(&addr(0x41), &p.id, VoteSupport::For, None)
            .await
            .unwrap();
        drop(gov);

        // second run: a fresh clock anchored at the stored genesis is past the window
        let clock = SystemClock::anchored(stores.parameters.as_ref(), 12).await.unwrap();
        assert!(clock.block_number() > p.end_block);
        let gov = open(stores.clone(), Arc::new(clock)).await;

        let (_, state) = gov.proposal(&p.id).await.unwrap();
        assert_eq!(state, ProposalState::Succeeded);
        assert!(matches!(
            gov.cast_vote(&addr(0x42), &p.id, VoteSupport::Against, None).await,
            Err(GovernanceError::ProposalNotActive { .. })
        ));
        gov.queue(&addr(0x41), &p.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_out_of_range_parameter_update_is_rejected() {
        let (gov, _) = setup(&[(0x41, 3)]).await;
        for update in [
            ParameterUpdate {
                grace_period_secs: Some(1 << 62),
                ..ParameterUpdate::default()
            },
            ParameterUpdate {
                voting_delay_blocks: Some(u64::MAX),
                ..ParameterUpdate::default()
            },
        ] {
            let err = gov
                .create_proposal(&addr(0x41), ProposalAction::UpdateParameters { update }, None, "x")
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                GovernanceError::Validation(AccredoError::InvalidParameter(_))
            ));
        }
        assert!(gov.engine().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let (gov, clock) = setup(&[(0x41, 3), (0x42, 3)]).await;
        let p = gov
            .create_proposal(&addr(0x41), ProposalAction::RevokeIssuer, Some(addr(UNI)), "x")
            .await
            .unwrap();

        let err = gov.cancel(&addr(0x42), &p.id).await.unwrap_err();
        assert_eq!(err.kind(), accredo_core::ErrorKind::Authorization);

        gov.cancel(&addr(0x41), &p.id).await.unwrap();
        clock.advance_blocks(1);
        assert!(matches!(
            gov.cast_vote(&addr(0x42), &p.id, VoteSupport::For, None).await,
            Err(GovernanceError::ProposalNotActive { state: ProposalState::Canceled, .. })
        ));

        let id = pass(&gov, &clock, ProposalAction::RevokeIssuer, Some(addr(UNI)), &[0x42]).await;
        gov.cancel(&addr(ADMIN), &id).await.unwrap();
        clock.advance_secs(100);
        assert!(matches!(
            gov.execute(&addr(0x42), &id).await,
            Err(GovernanceError::NotQueued(_))
        ));
    }

    #[tokio::test]
    async fn test_inactive_member_cannot_vote() {
        let (gov, clock) = setup(&[(0x41, 3), (0x42, 3)]).await;
        let p = gov
            .create_proposal(&addr(0x41), ProposalAction::RevokeIssuer, Some(addr(UNI)), "x")
            .await
            .unwrap();
        clock.advance_blocks(1);
        gov.deactivate_account(&addr(ADMIN), &addr(0x42)).await.unwrap();

        let err = gov
            .cast_vote(&addr(0x42), &p.id, VoteSupport::For, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::Identity(IdentityError::AccountInactive(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_are_all_counted() {
        let members: Vec<(u8, u64)> = (0x50..0x60).map(|b| (b, 1)).collect();
        let (gov, clock) = setup(&members).await;
        let p = gov
            .create_proposal(&addr(0x50), ProposalAction::RevokeIssuer, Some(addr(UNI)), "x")
            .await
            .unwrap();
        clock.advance_blocks(1);

        let mut handles = Vec::new();
        for (b, _) in &members {
            // every member votes twice at once; one of each pair must fail
            for _ in 0..2 {
                let gov = gov.clone();
                let id = p.id;
                let voter = addr(*b);
                handles.push(tokio::spawn(async move {
                    gov.cast_vote(&voter, &id, VoteSupport::For, None).await
                }));
            }
        }

        let mut accepted = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(GovernanceError::DuplicateVote { .. }) => duplicates += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(accepted, members.len());
        assert_eq!(duplicates, members.len());

        let p = gov.engine().require(&p.id).await.unwrap();
        assert_eq!(p.tally.for_votes, members.len() as u64);
        assert_eq!(gov.engine().votes(&p.id).await.unwrap().len(), members.len());
    }
}
