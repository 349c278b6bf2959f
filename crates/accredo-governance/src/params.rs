//! Live governance parameters shared by the engine, gate and governor

use accredo_core::GovernanceParams;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
pub struct SharedParams {
    inner: Arc<RwLock<GovernanceParams>>,
}

impl SharedParams {
    pub fn new(params: GovernanceParams) -> Self {
        Self {
            inner: Arc::new(RwLock::new(params)),
        }
    }

    /// Snapshot of the current values
    pub fn get(&self) -> GovernanceParams {
        self.inner
            .read()
            .map(|p| p.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn replace(&self, params: GovernanceParams) {
        match self.inner.write() {
            Ok(mut guard) => *guard = params,
            Err(poisoned) => *poisoned.into_inner() = params,
        }
    }
}
