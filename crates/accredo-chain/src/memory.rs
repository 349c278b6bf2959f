//! In-process chain used by tests and the demo

use accredo_core::WalletAddress;
use sha3::{Digest, Keccak256};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::{ChainClient, ChainError, Result, RoleAction, TxStatus};

#[derive(Debug, Clone)]
struct SentTx {
    action: RoleAction,
    account: WalletAddress,
    status: TxStatus,
}

#[derive(Debug, Default)]
struct ChainState {
    block: u64,
    nonce: u64,
    txs: HashMap<String, SentTx>,
    order: Vec<String>,
    role_holders: HashSet<WalletAddress>,
    fail_sends: u32,
    fail_status: u32,
}

/// Simulated chain holding the issuer role set.
///
/// With auto-mining (the default) every transaction is mined in its own
/// block as soon as it is sent. Without it, transactions stay pending until
/// [`mine`](Self::mine) is called.
#[derive(Debug)]
pub struct InMemoryChain {
    state: Mutex<ChainState>,
    auto_mine: bool,
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState::default()),
            auto_mine: true,
        }
    }

    pub fn with_auto_mine(mut self, auto_mine: bool) -> Self {
        self.auto_mine = auto_mine;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ChainState>> {
        self.state
            .lock()
            .map_err(|e| ChainError::Unavailable(format!("chain state poisoned: {e}")))
    }

    /// Make the next `n` submissions fail with a transport error
    pub fn fail_next_sends(&self, n: u32) {
        if let Ok(mut state) = self.lock() {
            state.fail_sends = n;
        }
    }

    /// Make the next `n` receipt queries fail with a transport error
    pub fn fail_next_status(&self, n: u32) {
        if let Ok(mut state) = self.lock() {
            state.fail_status = n;
        }
    }

    /// Mine every pending transaction into one new block
    pub fn mine(&self) {
        if let Ok(mut state) = self.lock() {
            state.block += 1;
            let block = state.block;
            let pending: Vec<String> = state
                .order
                .iter()
                .filter(|hash| matches!(state.txs.get(*hash).map(|t| t.status), Some(TxStatus::Pending)))
                .cloned()
                .collect();
            for hash in pending {
                apply(&mut state, &hash, block);
            }
        }
    }

    pub fn has_role(&self, account: &WalletAddress) -> bool {
        self.lock()
            .map(|state| state.role_holders.contains(account))
            .unwrap_or(false)
    }

    /// Number of transactions submitted so far
    pub fn sent_count(&self) -> usize {
        self.lock().map(|state| state.order.len()).unwrap_or(0)
    }
}

fn apply(state: &mut ChainState, hash: &str, block: u64) {
    let Some(tx) = state.txs.get_mut(hash) else {
        return;
    };
    tx.status = TxStatus::Mined { block };
    let (action, account) = (tx.action, tx.account);
    match action {
        RoleAction::Grant => {
            state.role_holders.insert(account);
        }
        RoleAction::Revoke => {
            state.role_holders.remove(&account);
        }
    }
}

#[async_trait::async_trait]
impl ChainClient for InMemoryChain {
    async fn send_role_tx(&self, action: RoleAction, account: &WalletAddress) -> Result<String> {
        let mut state = self.lock()?;
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(ChainError::Unavailable("simulated connection failure".into()));
        }

        state.nonce += 1;
        let mut hasher = Keccak256::new();
        hasher.update(state.nonce.to_be_bytes());
        hasher.update(account.as_bytes());
        let hash = format!("0x{}", hex::encode(hasher.finalize()));

        state.txs.insert(
            hash.clone(),
            SentTx {
                action,
                account: *account,
                status: TxStatus::Pending,
            },
        );
        state.order.push(hash.clone());

        if self.auto_mine {
            state.block += 1;
            let block = state.block;
            apply(&mut state, &hash, block);
        }
        Ok(hash)
    }

    async fn tx_status(&self, tx_hash: &str) -> Result<TxStatus> {
        let mut state = self.lock()?;
        if state.fail_status > 0 {
            state.fail_status -= 1;
            return Err(ChainError::Unavailable("simulated timeout".into()));
        }
        state
            .txs
            .get(tx_hash)
            .map(|tx| tx.status)
            .ok_or_else(|| ChainError::InvalidResponse(format!("unknown transaction {tx_hash}")))
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.lock()?.block)
    }
}
