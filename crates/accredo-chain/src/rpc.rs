//! EVM JSON-RPC client
//!
//! Role transactions go out through `eth_sendTransaction`; the node (or the
//! signing service behind it) holds the key for `from_address`. Receipts are
//! read with `eth_getTransactionReceipt` and heights with `eth_blockNumber`.

use accredo_core::WalletAddress;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{abi, parse_quantity, ChainClient, ChainError, Result, RoleAction, TxStatus};

/// Chain connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Credential registry contract holding the issuer role
    pub registry_contract: WalletAddress,

    /// Account whose transactions the node signs
    pub from_address: WalletAddress,

    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Attempts per RPC call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    4
}

fn default_request_timeout() -> u64 {
    30
}

impl ChainConfig {
    pub fn new(rpc_url: impl Into<String>, registry_contract: WalletAddress, from_address: WalletAddress) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            registry_contract,
            from_address,
            confirmation_timeout_secs: default_confirmation_timeout(),
            poll_interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout(),
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug)]
pub struct JsonRpcChainClient {
    client: reqwest::Client,
    config: ChainConfig,
}

impl JsonRpcChainClient {
    pub fn new(config: ChainConfig) -> Result<Self> {
        let url = url::Url::parse(&config.rpc_url)
            .map_err(|e| ChainError::Config(format!("invalid rpc_url {}: {e}", config.rpc_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ChainError::Config(format!(
                "rpc_url must be http(s), got {}",
                url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChainError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Send a JSON-RPC request and return its `result` field
    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainError::Unavailable(format!("{method}: request timed out"))
                } else {
                    ChainError::Unavailable(format!("{method}: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            return Err(ChainError::Unavailable(format!(
                "{method}: HTTP {}",
                resp.status()
            )));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(format!("{method}: {e}")))?;

        decode_response(method, json)
    }
}

/// Split a JSON-RPC envelope into its result or error
fn decode_response(method: &str, json: serde_json::Value) -> Result<serde_json::Value> {
    if let Some(error) = json.get("error") {
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown RPC error")
            .to_string();
        return Err(ChainError::Rpc { code, message });
    }

    json.get("result")
        .cloned()
        .ok_or_else(|| ChainError::InvalidResponse(format!("{method}: missing 'result' field")))
}

/// Interpret an `eth_getTransactionReceipt` result
fn receipt_status(receipt: &serde_json::Value) -> Result<TxStatus> {
    if receipt.is_null() {
        return Ok(TxStatus::Pending);
    }

    let block = receipt
        .get("blockNumber")
        .and_then(|b| b.as_str())
        .map(parse_quantity)
        .transpose()?
        .ok_or_else(|| ChainError::InvalidResponse("receipt without blockNumber".into()))?;

    match receipt.get("status").and_then(|s| s.as_str()) {
        Some("0x1") => Ok(TxStatus::Mined { block }),
        Some(_) => Ok(TxStatus::Reverted { block }),
        None => Err(ChainError::InvalidResponse("receipt without status".into())),
    }
}

#[async_trait::async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn send_role_tx(&self, action: RoleAction, account: &WalletAddress) -> Result<String> {
        let tx = serde_json::json!({
            "from": self.config.from_address.to_hex(),
            "to": self.config.registry_contract.to_hex(),
            "data": abi::encode_role_call(action, account),
        });

        let result = self
            .rpc_call("eth_sendTransaction", serde_json::json!([tx]))
            .await?;

        let tx_hash = result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse("eth_sendTransaction returned non-string result".into()))?;

        tracing::info!(%action, account = %account, tx_hash = %tx_hash, "role transaction submitted");
        Ok(tx_hash)
    }

    async fn tx_status(&self, tx_hash: &str) -> Result<TxStatus> {
        let receipt = self
            .rpc_call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?;
        receipt_status(&receipt)
    }

    async fn block_number(&self) -> Result<u64> {
        let result = self.rpc_call("eth_blockNumber", serde_json::json!([])).await?;
        let value = result
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse("eth_blockNumber returned non-string result".into()))?;
        parse_quantity(value)
    }
}
