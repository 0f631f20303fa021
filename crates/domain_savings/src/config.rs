//! Ledger policy settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

use core_kernel::Money;

/// Tunable ledger policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Amounts strictly above this are held for approval
    pub approval_threshold: Money,
    /// Longest wait for account locks before failing with a retryable error
    pub lock_timeout_ms: u64,
    /// Whether active accounts must keep their minimum balance on debits
    pub enforce_minimum_balance: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            approval_threshold: Money::from_major(50_000),
            lock_timeout_ms: 5_000,
            enforce_minimum_balance: true,
        }
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
