//! Accredo Chain
//!
//! Thin adapter over an EVM node used to mirror issuer accreditation as an
//! `AccessControl` role on the credential registry contract.
//!
//! # Modules
//!
//! - `abi`: selectors and calldata for `grantRole` / `revokeRole`
//! - `rpc`: JSON-RPC client (`eth_sendTransaction`, receipts, block height)
//! - `memory`: in-process chain for tests and the demo
//! - `retry`: bounded exponential backoff and confirmation polling

pub mod abi;
pub mod memory;
pub mod retry;
pub mod rpc;

pub use memory::InMemoryChain;
pub use retry::{await_confirmation, RetryPolicy, TxOutcome};
pub use rpc::{ChainConfig, JsonRpcChainClient};

use accredo_core::{ErrorKind, WalletAddress};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Network failure, timeout or non-2xx response from the node
    #[error("Chain unavailable: {0}")]
    Unavailable(String),

    /// The node answered with a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("Invalid chain configuration: {0}")]
    Config(String),
}

impl ChainError {
    /// Transport problems are worth retrying; answers from the node are not
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Unavailable(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::Config(_) => ErrorKind::Validation,
            _ => ErrorKind::ExternalDependency,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Which side of the issuer role a transaction moves an account to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleAction {
    Grant,
    Revoke,
}

impl RoleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleAction::Grant => "grant",
            RoleAction::Revoke => "revoke",
        }
    }
}

impl std::fmt::Display for RoleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receipt status of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    /// No receipt yet
    Pending,
    Mined { block: u64 },
    Reverted { block: u64 },
}

/// Operations the role mirror needs from a chain
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// Submit a `grantRole`/`revokeRole` transaction; returns its hash
    async fn send_role_tx(&self, action: RoleAction, account: &WalletAddress) -> Result<String>;

    async fn tx_status(&self, tx_hash: &str) -> Result<TxStatus>;

    async fn block_number(&self) -> Result<u64>;
}

/// Parse a `0x`-prefixed hex quantity as returned by the node
pub(crate) fn parse_quantity(value: &str) -> Result<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad quantity {value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_only_transport_errors_retry() {
        assert!(ChainError::Unavailable("timeout".into()).is_retryable());
        assert!(!ChainError::Rpc {
            code: -32000,
            message: "execution reverted".into()
        }
        .is_retryable());
        assert_eq!(
            ChainError::Config("x".into()).kind(),
            ErrorKind::Validation
        );
    }
}
