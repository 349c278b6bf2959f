//! Accredo Database
//!
//! PostgreSQL persistence for the governance service.
//!
//! This crate provides:
//! - Row models for accounts, issuers, credentials, proposals, votes,
//!   timelock entries, parameters and the audit log
//! - Implementations of every store trait the domain crates define
//! - Migration support via SQLx

pub mod models;
pub mod pool;
pub mod repos;

pub use pool::{DatabaseConfig, DatabasePool, PoolStats, Repositories};
pub use repos::{
    PgAccountStore, PgAuditLog, PgCredentialLedger, PgIssuerStore, PgParameterStore,
    PgProposalStore, PgTimelockStore,
};

use accredo_core::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// Map a failed insert, treating unique violations as duplicates
    pub(crate) fn on_insert(err: sqlx::Error, key: impl std::fmt::Display) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                DbError::Duplicate(key.to_string())
            }
            _ => DbError::Query(err),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(key) => StoreError::NotFound(key),
            DbError::Duplicate(key) => StoreError::Duplicate(key),
            DbError::Conflict(key) => StoreError::Conflict(key),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
