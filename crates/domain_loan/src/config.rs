//! Loan policy settings

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::Money;

/// Bounds applied when a loan application is submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanLimits {
    pub min_term_months: u32,
    pub max_term_months: u32,
    /// Annual rate, in percent
    pub min_rate_percent: Decimal,
    /// Annual rate, in percent
    pub max_rate_percent: Decimal,
    /// Longest wait for loan and guarantor locks
    pub lock_timeout_ms: u64,
}

impl Default for LoanLimits {
    fn default() -> Self {
        Self {
            min_term_months: 1,
            max_term_months: 240,
            min_rate_percent: Decimal::ZERO,
            max_rate_percent: Decimal::from(50),
            lock_timeout_ms: 5_000,
        }
    }
}

impl LoanLimits {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Caps on what a single member may guarantee at once
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureLimits {
    /// Simultaneous active guarantees
    pub max_guarantees: u32,
    /// Cumulative guaranteed amount on live loans
    pub max_exposure: Money,
}

impl Default for ExposureLimits {
    fn default() -> Self {
        Self {
            max_guarantees: 5,
            max_exposure: Money::from_major(500_000),
        }
    }
}
