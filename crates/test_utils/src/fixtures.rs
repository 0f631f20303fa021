//! Pre-built Test Fixtures
//!
//! Canonical amounts and dates, plus [`CoopHarness`]: a ledger and an
//! underwriting service wired to the same clock over any pair of storage
//! adapters.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use core_kernel::{FixedClock, MemberId, Money, SavingsAccountId};
use domain_loan::{
    ExposureLimits, InMemoryLoanRepository, Loan, LoanLimits, LoanRepository,
    LoanUnderwritingService,
};
use domain_savings::{
    InMemoryLedgerRepository, LedgerConfig, LedgerRepository, LedgerStore, SavingsAccount,
};

use crate::builders::{LoanApplicationBuilder, OpenAccountBuilder};

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// A routine deposit
    pub fn deposit() -> Money {
        Money::new(dec!(1000.00))
    }

    /// The default approval threshold; postings at this amount still auto-complete
    pub fn approval_threshold() -> Money {
        Money::from_major(50_000)
    }

    /// One cent above the default approval threshold
    pub fn above_approval_threshold() -> Money {
        Money::new(dec!(50000.01))
    }

    /// A typical loan principal
    pub fn loan_principal() -> Money {
        Money::from_major(100_000)
    }

    /// The default per-guarantor exposure cap
    pub fn exposure_cap() -> Money {
        Money::from_major(500_000)
    }
}

/// Fixture for dates
pub struct DateFixtures;

impl DateFixtures {
    /// The business date every fixture clock starts on
    pub fn business_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    pub fn year_end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
    }
}

/// Ledger plus underwriting service sharing one fixed clock
pub struct CoopHarness {
    pub clock: Arc<FixedClock>,
    pub ledger: Arc<LedgerStore>,
    pub loans: Arc<LoanUnderwritingService>,
}

impl CoopHarness {
    /// Everything in memory with default limits
    pub fn in_memory() -> Self {
        Self::with_repositories(
            Arc::new(InMemoryLedgerRepository::new()),
            Arc::new(InMemoryLoanRepository::new()),
        )
    }

    /// Default limits over the given adapters
    pub fn with_repositories(
        ledger_repository: Arc<dyn LedgerRepository>,
        loan_repository: Arc<dyn LoanRepository>,
    ) -> Self {
        let clock = Arc::new(FixedClock::on(DateFixtures::business_date()));
        let ledger = Arc::new(LedgerStore::new(
            ledger_repository,
            LedgerConfig::default(),
            clock.clone(),
        ));
        let loans = Arc::new(LoanUnderwritingService::new(
            loan_repository,
            ledger.clone(),
            LoanLimits::default(),
            ExposureLimits::default(),
            clock.clone(),
        ));
        Self {
            clock,
            ledger,
            loans,
        }
    }

    /// Opens a regular account for a fresh member with `opening` on deposit
    ///
    /// # Panics
    ///
    /// Panics if the ledger refuses the account
    pub async fn funded_account(&self, opening: Money) -> SavingsAccount {
        self.ledger
            .open_account(
                OpenAccountBuilder::new()
                    .with_opening_balance(opening)
                    .build(),
            )
            .await
            .expect("Failed to open funded account")
    }

    /// A fresh member with an empty account, as `(member, account)`
    pub async fn member(&self) -> (MemberId, SavingsAccountId) {
        let account = self.funded_account(Money::ZERO).await;
        (account.member_id, account.id)
    }

    /// Submits a pending loan paying out into a fresh member's account
    ///
    /// # Panics
    ///
    /// Panics if submission fails
    pub async fn pending_loan(&self, principal: Money) -> Loan {
        let (member_id, account_id) = self.member().await;
        self.loans
            .submit(
                LoanApplicationBuilder::new(member_id, account_id)
                    .with_principal(principal)
                    .build(),
            )
            .await
            .expect("Failed to submit loan")
    }
}
