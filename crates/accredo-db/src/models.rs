//! Row types and their conversions to domain records
//!
//! Addresses are stored as lowercase `0x` hex, proposal ids as bare hex. Unsigned
//! counters become `BIGINT`; values past `i64::MAX` are refused on write.

use accredo_core::{
    Account, ChainSync, CredentialRecord, IssuerRecord, Proposal, ProposalAction, ProposalId,
    Tally, TimelockEntry, TokenId, Vote, VoteSupport, WalletAddress,
};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::{DbError, Result};

pub(crate) fn to_i64(field: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| DbError::Serialization(format!("{field} out of range: {value}")))
}

pub(crate) fn to_u64(field: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| DbError::Serialization(format!("negative {field}: {value}")))
}

fn parse<T>(value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| DbError::Serialization(e.to_string()))
}

fn parse_opt<T>(value: Option<&str>) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.map(parse).transpose()
}

#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub address: String,
    pub role: String,
    pub display_name: String,
    pub metadata_uri: Option<String>,
    pub voting_weight: i64,
    pub active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = DbError;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Account {
            address: parse(&row.address)?,
            role: parse(&row.role)?,
            display_name: row.display_name,
            metadata_uri: row.metadata_uri,
            voting_weight: to_u64("voting_weight", row.voting_weight)?,
            active: row.active,
            version: to_u64("version", row.version)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct IssuerRow {
    pub address: String,
    pub name: String,
    pub registered: bool,
    pub accredited: bool,
    pub suspended: bool,
    pub suspension_reason: Option<String>,
    pub metadata_uri: Option<String>,
    pub chain_sync: serde_json::Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<IssuerRow> for IssuerRecord {
    type Error = DbError;

    fn try_from(row: IssuerRow) -> Result<Self> {
        let chain_sync: ChainSync = serde_json::from_value(row.chain_sync)?;
        Ok(IssuerRecord {
            address: parse(&row.address)?,
            name: row.name,
            registered: row.registered,
            accredited: row.accredited,
            suspended: row.suspended,
            suspension_reason: row.suspension_reason,
            metadata_uri: row.metadata_uri,
            chain_sync,
            version: to_u64("version", row.version)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CredentialRow {
    pub token_id: i64,
    pub issuer: String,
    pub holder: String,
    pub metadata_uri: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
}

impl TryFrom<CredentialRow> for CredentialRecord {
    type Error = DbError;

    fn try_from(row: CredentialRow) -> Result<Self> {
        Ok(CredentialRecord {
            token_id: TokenId(to_u64("token_id", row.token_id)?),
            issuer: parse(&row.issuer)?,
            holder: parse(&row.holder)?,
            metadata_uri: row.metadata_uri,
            issued_at: row.issued_at,
            revoked_at: row.revoked_at,
            revoked_by: parse_opt::<WalletAddress>(row.revoked_by.as_deref())?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProposalRow {
    pub id: String,
    pub proposer: String,
    pub action: serde_json::Value,
    pub target: Option<String>,
    pub description: String,
    pub for_votes: i64,
    pub against_votes: i64,
    pub abstain_votes: i64,
    pub state: String,
    pub start_block: i64,
    pub end_block: i64,
    pub eta: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = DbError;

    fn try_from(row: ProposalRow) -> Result<Self> {
        let action: ProposalAction = serde_json::from_value(row.action)?;
        Ok(Proposal {
            id: parse(&row.id)?,
            proposer: parse(&row.proposer)?,
            action,
            target: parse_opt(row.target.as_deref())?,
            description: row.description,
            tally: Tally {
                for_votes: to_u64("for_votes", row.for_votes)?,
                against_votes: to_u64("against_votes", row.against_votes)?,
                abstain_votes: to_u64("abstain_votes", row.abstain_votes)?,
            },
            state: parse(&row.state)?,
            start_block: to_u64("start_block", row.start_block)?,
            end_block: to_u64("end_block", row.end_block)?,
            eta: row.eta,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VoteRow {
    pub proposal_id: String,
    pub voter: String,
    pub support: i16,
    pub weight: i64,
    pub reason: Option<String>,
    pub cast_at: DateTime<Utc>,
}

impl TryFrom<VoteRow> for Vote {
    type Error = DbError;

    fn try_from(row: VoteRow) -> Result<Self> {
        let support = u8::try_from(row.support)
            .map_err(|_| DbError::Serialization(format!("invalid support {}", row.support)))
            .and_then(|s| {
                VoteSupport::try_from(s).map_err(|e| DbError::Serialization(e.to_string()))
            })?;
        Ok(Vote {
            proposal_id: parse(&row.proposal_id)?,
            voter: parse(&row.voter)?,
            support,
            weight: to_u64("weight", row.weight)?,
            reason: row.reason,
            cast_at: row.cast_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TimelockRow {
    pub proposal_id: String,
    pub eta: DateTime<Utc>,
    pub grace_deadline: DateTime<Utc>,
    pub status: String,
    pub queued_at: DateTime<Utc>,
}

impl TryFrom<TimelockRow> for TimelockEntry {
    type Error = DbError;

    fn try_from(row: TimelockRow) -> Result<Self> {
        Ok(TimelockEntry {
            proposal_id: parse::<ProposalId>(&row.proposal_id)?,
            eta: row.eta,
            grace_deadline: row.grace_deadline,
            status: parse(&row.status)?,
            queued_at: row.queued_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditRow {
    pub event_type: String,
    pub subject: Option<String>,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for accredo_governance::AuditEntry {
    type Error = DbError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(accredo_governance::AuditEntry {
            event_type: row.event_type,
            subject: parse_opt(row.subject.as_deref())?,
            payload: row.payload,
            recorded_at: row.recorded_at,
        })
    }
}
