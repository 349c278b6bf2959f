//! PostgreSQL implementations of the domain store traits
//!
//! Versioned writes use `UPDATE ... WHERE version = $expected`; a miss is
//! reported as `Conflict` when the row exists and `NotFound` otherwise.

use accredo_core::{
    Account, CredentialRecord, GovernanceParams, IssuerRecord, Proposal, ProposalId,
    ProposalState, StoreError, TimelockEntry, TimelockStatus, TokenId, Vote, WalletAddress,
};
use accredo_governance::{AuditEntry, AuditSink, ParameterStore, ProposalStore, TimelockStore};
use accredo_identity::AccountStore;
use accredo_registry::{CredentialLedger, IssuerStore};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{
    to_i64, AccountRow, AuditRow, CredentialRow, IssuerRow, ProposalRow, TimelockRow, VoteRow,
};
use crate::DbError;

type StoreResult<T> = std::result::Result<T, StoreError>;

fn db(err: sqlx::Error) -> StoreError {
    DbError::Query(err).into()
}

fn insert_err(key: impl std::fmt::Display) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| DbError::on_insert(err, key).into()
}

fn convert<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter()
        .map(|r| T::try_from(r).map_err(StoreError::from))
        .collect()
}

/// After a guarded update matched nothing: `Conflict` if the row exists
async fn miss(pool: &PgPool, table: &str, key_column: &str, key: &str, detail: String) -> StoreError {
    let query = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE {key_column} = $1)");
    match sqlx::query_scalar::<_, bool>(&query)
        .bind(key)
        .fetch_one(pool)
        .await
    {
        Ok(true) => StoreError::Conflict(detail),
        Ok(false) => StoreError::NotFound(key.to_string()),
        Err(e) => db(e),
    }
}

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AccountStore for PgAccountStore {
    async fn insert(&self, account: Account) -> StoreResult<Account> {
        let row: AccountRow = sqlx::query_as(
            r#"
            INSERT INTO accounts (address, role, display_name, metadata_uri, voting_weight,
                                  active, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(account.address.to_hex())
        .bind(account.role.as_str())
        .bind(&account.display_name)
        .bind(&account.metadata_uri)
        .bind(to_i64("voting_weight", account.voting_weight)?)
        .bind(account.active)
        .bind(to_i64("version", account.version)?)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(insert_err(account.address))?;

        Ok(Account::try_from(row)?)
    }

    async fn get(&self, address: &WalletAddress) -> StoreResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as("SELECT * FROM accounts WHERE address = $1")
            .bind(address.to_hex())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        Ok(row.map(Account::try_from).transpose()?)
    }

    async fn list(&self) -> StoreResult<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as("SELECT * FROM accounts ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        convert(rows)
    }

    async fn compare_and_swap(&self, expected_version: u64, next: Account) -> StoreResult<Account> {
        let key = next.address.to_hex();
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET role = $1, display_name = $2, metadata_uri = $3, voting_weight = $4,
                active = $5, version = version + 1, updated_at = NOW()
            WHERE address = $6 AND version = $7
            RETURNING *
            "#,
        )
        .bind(next.role.as_str())
        .bind(&next.display_name)
        .bind(&next.metadata_uri)
        .bind(to_i64("voting_weight", next.voting_weight)?)
        .bind(next.active)
        .bind(&key)
        .bind(to_i64("version", expected_version)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match row {
            Some(row) => Ok(Account::try_from(row)?),
            None => Err(miss(
                &self.pool,
                "accounts",
                "address",
                &key,
                format!("account {key} is not at version {expected_version}"),
            )
            .await),
        }
    }
}

pub struct PgIssuerStore {
    pool: PgPool,
}

impl PgIssuerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IssuerStore for PgIssuerStore {
    async fn insert(&self, record: IssuerRecord) -> StoreResult<IssuerRecord> {
        let chain_sync = serde_json::to_value(&record.chain_sync).map_err(DbError::from)?;
        let row: IssuerRow = sqlx::query_as(
            r#"
            INSERT INTO issuers (address, name, registered, accredited, suspended, suspension_reason,
                                 metadata_uri, chain_sync, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(record.address.to_hex())
        .bind(&record.name)
        .bind(record.registered)
        .bind(record.accredited)
        .bind(record.suspended)
        .bind(&record.suspension_reason)
        .bind(&record.metadata_uri)
        .bind(chain_sync)
        .bind(to_i64("version", record.version)?)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(insert_err(record.address))?;

        Ok(IssuerRecord::try_from(row)?)
    }

    async fn get(&self, address: &WalletAddress) -> StoreResult<Option<IssuerRecord>> {
        let row: Option<IssuerRow> = sqlx::query_as("SELECT * FROM issuers WHERE address = $1")
            .bind(address.to_hex())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        Ok(row.map(IssuerRecord::try_from).transpose()?)
    }

    async fn list(&self) -> StoreResult<Vec<IssuerRecord>> {
        let rows: Vec<IssuerRow> = sqlx::query_as("SELECT * FROM issuers ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        convert(rows)
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        next: IssuerRecord,
    ) -> StoreResult<IssuerRecord> {
        let key = next.address.to_hex();
        let chain_sync = serde_json::to_value(&next.chain_sync).map_err(DbError::from)?;
        let row: Option<IssuerRow> = sqlx::query_as(
            r#"
            UPDATE issuers
            SET name = $1, registered = $2, accredited = $3, suspended = $4,
                suspension_reason = $5, metadata_uri = $6, chain_sync = $7,
                version = version + 1, updated_at = NOW()
            WHERE address = $8 AND version = $9
            RETURNING *
            "#,
        )
        .bind(&next.name)
        .bind(next.registered)
        .bind(next.accredited)
        .bind(next.suspended)
        .bind(&next.suspension_reason)
        .bind(&next.metadata_uri)
        .bind(chain_sync)
        .bind(&key)
        .bind(to_i64("version", expected_version)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match row {
            Some(row) => Ok(IssuerRecord::try_from(row)?),
            None => Err(miss(
                &self.pool,
                "issuers",
                "address",
                &key,
                format!("issuer {key} is not at version {expected_version}"),
            )
            .await),
        }
    }
}

pub struct PgCredentialLedger {
    pool: PgPool,
}

impl PgCredentialLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialLedger for PgCredentialLedger {
    async fn record_issuance(&self, record: CredentialRecord) -> StoreResult<CredentialRecord> {
        let row: CredentialRow = sqlx::query_as(
            r#"
            INSERT INTO credentials (token_id, issuer, holder, metadata_uri, issued_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(to_i64("token_id", record.token_id.0)?)
        .bind(record.issuer.to_hex())
        .bind(record.holder.to_hex())
        .bind(&record.metadata_uri)
        .bind(record.issued_at)
        .fetch_one(&self.pool)
        .await
        .map_err(insert_err(record.token_id))?;

        Ok(CredentialRecord::try_from(row)?)
    }

    async fn record_revocation(
        &self,
        token_id: TokenId,
        by: WalletAddress,
        at: DateTime<Utc>,
    ) -> StoreResult<CredentialRecord> {
        let row: Option<CredentialRow> = sqlx::query_as(
            r#"
            UPDATE credentials SET revoked_at = $1, revoked_by = $2
            WHERE token_id = $3 AND revoked_at IS NULL
            RETURNING *
            "#,
        )
        .bind(at)
        .bind(by.to_hex())
        .bind(to_i64("token_id", token_id.0)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match row {
            Some(row) => Ok(CredentialRecord::try_from(row)?),
            None => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM credentials WHERE token_id = $1)",
                )
                .bind(to_i64("token_id", token_id.0)?)
                .fetch_one(&self.pool)
                .await
                .map_err(db)?;
                if exists {
                    Err(StoreError::Conflict(format!("credential {token_id} already revoked")))
                } else {
                    Err(StoreError::NotFound(token_id.to_string()))
                }
            }
        }
    }

    async fn get(&self, token_id: TokenId) -> StoreResult<Option<CredentialRecord>> {
        let row: Option<CredentialRow> =
            sqlx::query_as("SELECT * FROM credentials WHERE token_id = $1")
                .bind(to_i64("token_id", token_id.0)?)
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;
        Ok(row.map(CredentialRecord::try_from).transpose()?)
    }

    async fn list_by_issuer(&self, issuer: &WalletAddress) -> StoreResult<Vec<CredentialRecord>> {
        let rows: Vec<CredentialRow> =
            sqlx::query_as("SELECT * FROM credentials WHERE issuer = $1 ORDER BY token_id")
                .bind(issuer.to_hex())
                .fetch_all(&self.pool)
                .await
                .map_err(db)?;
        convert(rows)
    }

    async fn list_by_holder(&self, holder: &WalletAddress) -> StoreResult<Vec<CredentialRecord>> {
        let rows: Vec<CredentialRow> =
            sqlx::query_as("SELECT * FROM credentials WHERE holder = $1 ORDER BY token_id")
                .bind(holder.to_hex())
                .fetch_all(&self.pool)
                .await
                .map_err(db)?;
        convert(rows)
    }

    async fn issuer_has_outstanding_credentials(&self, issuer: &WalletAddress) -> StoreResult<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM credentials WHERE issuer = $1 AND revoked_at IS NULL)",
        )
        .bind(issuer.to_hex())
        .fetch_one(&self.pool)
        .await
        .map_err(db)
    }
}

pub struct PgProposalStore {
    pool: PgPool,
}

impl PgProposalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProposalStore for PgProposalStore {
    async fn insert(&self, proposal: Proposal) -> StoreResult<Proposal> {
        let action = serde_json::to_value(&proposal.action).map_err(DbError::from)?;
        let row: ProposalRow = sqlx::query_as(
            r#"
            INSERT INTO proposals (id, proposer, action, target, description, for_votes,
                                   against_votes, abstain_votes, state, start_block, end_block,
                                   eta, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(proposal.id.to_hex())
        .bind(proposal.proposer.to_hex())
        .bind(action)
        .bind(proposal.target.map(|t| t.to_hex()))
        .bind(&proposal.description)
        .bind(to_i64("for_votes", proposal.tally.for_votes)?)
        .bind(to_i64("against_votes", proposal.tally.against_votes)?)
        .bind(to_i64("abstain_votes", proposal.tally.abstain_votes)?)
        .bind(proposal.state.as_str())
        .bind(to_i64("start_block", proposal.start_block)?)
        .bind(to_i64("end_block", proposal.end_block)?)
        .bind(proposal.eta)
        .bind(proposal.created_at)
        .bind(proposal.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(insert_err(proposal.id))?;

        Ok(Proposal::try_from(row)?)
    }

    async fn get(&self, id: &ProposalId) -> StoreResult<Option<Proposal>> {
        let row: Option<ProposalRow> = sqlx::query_as("SELECT * FROM proposals WHERE id = $1")
            .bind(id.to_hex())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        Ok(row.map(Proposal::try_from).transpose()?)
    }

    async fn list(&self) -> StoreResult<Vec<Proposal>> {
        let rows: Vec<ProposalRow> = sqlx::query_as("SELECT * FROM proposals ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        convert(rows)
    }

    /// The proposal row is locked for the whole transaction, so concurrent
    /// votes serialize and the primary key on `(proposal_id, voter)` rejects
    /// a second receipt.
    async fn record_vote(&self, vote: Vote) -> StoreResult<Proposal> {
        let key = vote.proposal_id.to_hex();
        let mut tx = self.pool.begin().await.map_err(db)?;

        let row: Option<ProposalRow> =
            sqlx::query_as("SELECT * FROM proposals WHERE id = $1 FOR UPDATE")
                .bind(&key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db)?;
        let mut proposal =
            Proposal::try_from(row.ok_or_else(|| StoreError::NotFound(key.clone()))?)?;

        sqlx::query(
            r#"
            INSERT INTO votes (proposal_id, voter, support, weight, reason, cast_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&key)
        .bind(vote.voter.to_hex())
        .bind(vote.support as u8 as i16)
        .bind(to_i64("weight", vote.weight)?)
        .bind(&vote.reason)
        .bind(vote.cast_at)
        .execute(&mut *tx)
        .await
        .map_err(insert_err(format!("{} on {}", vote.voter, key)))?;

        proposal.tally.add(vote.support, vote.weight);
        proposal.updated_at = vote.cast_at;
        sqlx::query(
            r#"
            UPDATE proposals
            SET for_votes = $1, against_votes = $2, abstain_votes = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(to_i64("for_votes", proposal.tally.for_votes)?)
        .bind(to_i64("against_votes", proposal.tally.against_votes)?)
        .bind(to_i64("abstain_votes", proposal.tally.abstain_votes)?)
        .bind(proposal.updated_at)
        .bind(&key)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(proposal)
    }

    async fn get_vote(&self, id: &ProposalId, voter: &WalletAddress) -> StoreResult<Option<Vote>> {
        let row: Option<VoteRow> =
            sqlx::query_as("SELECT * FROM votes WHERE proposal_id = $1 AND voter = $2")
                .bind(id.to_hex())
                .bind(voter.to_hex())
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;
        Ok(row.map(Vote::try_from).transpose()?)
    }

    async fn votes(&self, id: &ProposalId) -> StoreResult<Vec<Vote>> {
        if self.get(id).await?.is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let rows: Vec<VoteRow> =
            sqlx::query_as("SELECT * FROM votes WHERE proposal_id = $1 ORDER BY cast_at")
                .bind(id.to_hex())
                .fetch_all(&self.pool)
                .await
                .map_err(db)?;
        convert(rows)
    }

    async fn transition(
        &self,
        id: &ProposalId,
        from: &[ProposalState],
        to: ProposalState,
        eta: Option<DateTime<Utc>>,
    ) -> StoreResult<Proposal> {
        let key = id.to_hex();
        let allowed: Vec<String> = from
            .iter()
            .filter(|s| s.can_transition_to(to))
            .map(|s| s.as_str().to_string())
            .collect();

        let row: Option<ProposalRow> = sqlx::query_as(
            r#"
            UPDATE proposals
            SET state = $1, eta = COALESCE($2, eta), updated_at = NOW()
            WHERE id = $3 AND state = ANY($4)
            RETURNING *
            "#,
        )
        .bind(to.as_str())
        .bind(eta)
        .bind(&key)
        .bind(allowed)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match row {
            Some(row) => Ok(Proposal::try_from(row)?),
            None => Err(miss(
                &self.pool,
                "proposals",
                "id",
                &key,
                format!("proposal {key} cannot move to {to}"),
            )
            .await),
        }
    }
}

pub struct PgTimelockStore {
    pool: PgPool,
}

impl PgTimelockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TimelockStore for PgTimelockStore {
    async fn insert(&self, entry: TimelockEntry) -> StoreResult<TimelockEntry> {
        let row: TimelockRow = sqlx::query_as(
            r#"
            INSERT INTO timelock_entries (proposal_id, eta, grace_deadline, status, queued_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(entry.proposal_id.to_hex())
        .bind(entry.eta)
        .bind(entry.grace_deadline)
        .bind(entry.status.as_str())
        .bind(entry.queued_at)
        .fetch_one(&self.pool)
        .await
        .map_err(insert_err(entry.proposal_id))?;

        Ok(TimelockEntry::try_from(row)?)
    }

    async fn get(&self, id: &ProposalId) -> StoreResult<Option<TimelockEntry>> {
        let row: Option<TimelockRow> =
            sqlx::query_as("SELECT * FROM timelock_entries WHERE proposal_id = $1")
                .bind(id.to_hex())
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;
        Ok(row.map(TimelockEntry::try_from).transpose()?)
    }

    async fn set_status(
        &self,
        id: &ProposalId,
        expected: TimelockStatus,
        next: TimelockStatus,
    ) -> StoreResult<TimelockEntry> {
        let key = id.to_hex();
        let row: Option<TimelockRow> = sqlx::query_as(
            r#"
            UPDATE timelock_entries SET status = $1
            WHERE proposal_id = $2 AND status = $3
            RETURNING *
            "#,
        )
        .bind(next.as_str())
        .bind(&key)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match row {
            Some(row) => Ok(TimelockEntry::try_from(row)?),
            None => Err(miss(
                &self.pool,
                "timelock_entries",
                "proposal_id",
                &key,
                format!("timelock entry {key} is not {}", expected.as_str()),
            )
            .await),
        }
    }
}

pub struct PgParameterStore {
    pool: PgPool,
}

impl PgParameterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ParameterStore for PgParameterStore {
    async fn load(&self) -> StoreResult<Option<GovernanceParams>> {
        let value: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT params FROM governance_params WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;
        Ok(value
            .map(serde_json::from_value)
            .transpose()
            .map_err(DbError::from)?)
    }

    async fn save(&self, params: &GovernanceParams) -> StoreResult<()> {
        let value = serde_json::to_value(params).map_err(DbError::from)?;
        sqlx::query(
            r#"
            INSERT INTO governance_params (id, params, updated_at) VALUES (1, $1, NOW())
            ON CONFLICT (id) DO UPDATE SET params = EXCLUDED.params, updated_at = NOW()
            "#,
        )
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn genesis(&self, candidate: DateTime<Utc>) -> StoreResult<DateTime<Utc>> {
        sqlx::query(
            "INSERT INTO governance_clock (id, genesis) VALUES (1, $1) ON CONFLICT (id) DO NOTHING",
        )
        .bind(candidate)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        sqlx::query_scalar::<_, DateTime<Utc>>("SELECT genesis FROM governance_clock WHERE id = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db)
    }
}

pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AuditSink for PgAuditLog {
    async fn append(&self, entry: AuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (event_type, subject, payload, recorded_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&entry.event_type)
        .bind(entry.subject.map(|s| s.to_hex()))
        .bind(&entry.payload)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT event_type, subject, payload, recorded_at FROM audit_log ORDER BY id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        convert(rows)
    }
}
