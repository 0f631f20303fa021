//! Loan aggregate
//!
//! # Lifecycle
//!
//! ```text
//! Pending -> Approved -> Active -> Paid
//!    |          |          \-> Defaulted
//!    |          \-> Rejected | Cancelled
//!    \-> Rejected | Cancelled
//! ```
//!
//! `Overdue` is never stored; it is derived for display when an active loan's
//! next payment date has passed.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{LoanId, MemberId, Money, RepaymentId, SavingsAccountId, TransactionId};

use crate::amortization::{self, ScheduleSummary};
use crate::error::LoanError;

/// Persisted loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Approved,
    /// Disbursed and being repaid
    Active,
    Paid,
    Rejected,
    Cancelled,
    Defaulted,
}

impl LoanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Paid | LoanStatus::Rejected | LoanStatus::Cancelled | LoanStatus::Defaulted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Active => "active",
            LoanStatus::Paid => "paid",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Cancelled => "cancelled",
            LoanStatus::Defaulted => "defaulted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(LoanStatus::Pending),
            "approved" => Some(LoanStatus::Approved),
            "active" => Some(LoanStatus::Active),
            "paid" => Some(LoanStatus::Paid),
            "rejected" => Some(LoanStatus::Rejected),
            "cancelled" => Some(LoanStatus::Cancelled),
            "defaulted" => Some(LoanStatus::Defaulted),
            _ => None,
        }
    }
}

/// Status as shown to members, including the derived overdue state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanDisplayStatus {
    Pending,
    Approved,
    Active,
    Overdue,
    Paid,
    Rejected,
    Cancelled,
    Defaulted,
}

impl From<LoanStatus> for LoanDisplayStatus {
    fn from(status: LoanStatus) -> Self {
        match status {
            LoanStatus::Pending => LoanDisplayStatus::Pending,
            LoanStatus::Approved => LoanDisplayStatus::Approved,
            LoanStatus::Active => LoanDisplayStatus::Active,
            LoanStatus::Paid => LoanDisplayStatus::Paid,
            LoanStatus::Rejected => LoanDisplayStatus::Rejected,
            LoanStatus::Cancelled => LoanDisplayStatus::Cancelled,
            LoanStatus::Defaulted => LoanDisplayStatus::Defaulted,
        }
    }
}

/// A member's loan application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanApplication {
    pub member_id: MemberId,
    pub principal: Money,
    pub purpose: String,
    pub term_months: u32,
    pub annual_rate_percent: Decimal,
    /// Savings account that receives the disbursement
    pub disbursement_account: SavingsAccountId,
}

/// A loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub member_id: MemberId,
    pub principal: Money,
    pub purpose: String,
    pub term_months: u32,
    pub annual_rate_percent: Decimal,
    pub monthly_payment: Money,
    pub total_interest: Money,
    pub total_repaid: Money,
    pub repayment_count: u32,
    pub disbursement_account: SavingsAccountId,
    pub status: LoanStatus,
    pub application_date: NaiveDate,
    pub approval_date: Option<NaiveDate>,
    pub disbursement_date: Option<NaiveDate>,
    pub next_payment_date: Option<NaiveDate>,
    /// Date the loan reached a terminal status
    pub closed_date: Option<NaiveDate>,
    pub disbursement_transaction_id: Option<TransactionId>,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// Creates a pending loan with its installment quoted
    pub fn submit(application: &LoanApplication, quote: ScheduleSummary, now: DateTime<Utc>) -> Self {
        Self {
            id: LoanId::new_v7(),
            member_id: application.member_id,
            principal: application.principal,
            purpose: application.purpose.trim().to_string(),
            term_months: application.term_months,
            annual_rate_percent: application.annual_rate_percent,
            monthly_payment: quote.monthly_payment,
            total_interest: quote.total_interest,
            total_repaid: Money::ZERO,
            repayment_count: 0,
            disbursement_account: application.disbursement_account,
            status: LoanStatus::Pending,
            application_date: now.date_naive(),
            approval_date: None,
            disbursement_date: None,
            next_payment_date: None,
            closed_date: None,
            disbursement_transaction_id: None,
            status_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `(principal + total interest) - total repaid`, never negative
    pub fn remaining_balance(&self) -> Money {
        amortization::remaining_balance(self.principal, self.total_interest, self.total_repaid)
    }

    pub fn total_payable(&self) -> Money {
        self.principal + self.total_interest
    }

    pub fn display_status(&self, today: NaiveDate) -> LoanDisplayStatus {
        match (self.status, self.next_payment_date) {
            (LoanStatus::Active, Some(due)) if due < today => LoanDisplayStatus::Overdue,
            (status, _) => status.into(),
        }
    }

    fn invalid(&self, action: &'static str) -> LoanError {
        LoanError::InvalidStateTransition {
            loan_id: self.id,
            from: self.status,
            action,
        }
    }

    /// Fails unless the loan is in `expected`
    pub fn ensure_status(&self, expected: LoanStatus, action: &'static str) -> Result<(), LoanError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<(), LoanError> {
        if self.status != LoanStatus::Pending {
            return Err(self.invalid("approve"));
        }
        self.status = LoanStatus::Approved;
        self.approval_date = Some(now.date_naive());
        self.touch(now);
        Ok(())
    }

    /// Rejects or cancels before disbursement
    pub fn close_unfunded(
        &mut self,
        status: LoanStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LoanError> {
        let action = match status {
            LoanStatus::Rejected => "reject",
            LoanStatus::Cancelled => "cancel",
            _ => return Err(LoanError::validation("loans can only be rejected or cancelled here")),
        };
        if !matches!(self.status, LoanStatus::Pending | LoanStatus::Approved) {
            return Err(self.invalid(action));
        }
        self.status = status;
        self.status_reason = reason;
        self.closed_date = Some(now.date_naive());
        self.touch(now);
        Ok(())
    }

    /// Fixes the installment and starts the repayment clock
    pub fn activate(
        &mut self,
        schedule: ScheduleSummary,
        transaction_id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<(), LoanError> {
        if self.status != LoanStatus::Approved {
            return Err(self.invalid("disburse"));
        }
        let today = now.date_naive();
        self.monthly_payment = schedule.monthly_payment;
        self.total_interest = schedule.total_interest;
        self.status = LoanStatus::Active;
        self.disbursement_date = Some(today);
        self.next_payment_date = Some(amortization::add_months(today, 1));
        self.disbursement_transaction_id = Some(transaction_id);
        self.touch(now);
        Ok(())
    }

    /// Books a repayment; returns true when it settles the loan
    pub fn apply_repayment(&mut self, amount: Money, now: DateTime<Utc>) -> Result<bool, LoanError> {
        if self.status != LoanStatus::Active {
            return Err(self.invalid("repay"));
        }
        self.total_repaid += amount;
        self.repayment_count += 1;

        let settled = !self.remaining_balance().is_positive();
        if settled {
            self.status = LoanStatus::Paid;
            self.next_payment_date = None;
            self.closed_date = Some(now.date_naive());
        } else {
            let base = self.next_payment_date.unwrap_or(now.date_naive());
            self.next_payment_date = Some(amortization::add_months(base, 1));
        }
        self.touch(now);
        Ok(settled)
    }

    pub fn mark_defaulted(&mut self, now: DateTime<Utc>) -> Result<(), LoanError> {
        if self.status != LoanStatus::Active {
            return Err(self.invalid("default"));
        }
        self.status = LoanStatus::Defaulted;
        self.closed_date = Some(now.date_naive());
        self.touch(now);
        Ok(())
    }
}

/// Where a repayment comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum RepaymentSource {
    /// Debited from a member savings account through the ledger
    Account {
        account_id: SavingsAccountId,
        reference: Option<String>,
    },
    /// Already collected elsewhere (cash desk, bank); only the reference is kept
    External { reference: String },
}

/// A recorded repayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRepayment {
    pub id: RepaymentId,
    pub loan_id: LoanId,
    pub amount: Money,
    pub reference: String,
    pub source_account: Option<SavingsAccountId>,
    pub transaction_id: Option<TransactionId>,
    pub paid_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn loan() -> Loan {
        let application = LoanApplication {
            member_id: MemberId::new(),
            principal: Money::from_major(1_200),
            purpose: " School fees ".into(),
            term_months: 12,
            annual_rate_percent: Decimal::ZERO,
            disbursement_account: SavingsAccountId::new(),
        };
        let quote = amortization::compute_schedule(application.principal, dec!(0), 12);
        Loan::submit(&application, quote, now())
    }

    #[test]
    fn test_submit_quotes_installment() {
        let loan = loan();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.purpose, "School fees");
        assert_eq!(loan.monthly_payment, Money::from_major(100));
        assert_eq!(loan.remaining_balance(), Money::from_major(1_200));
    }

    #[test]
    fn test_cannot_disburse_pending() {
        let mut loan = loan();
        let quote = amortization::compute_schedule(loan.principal, dec!(0), 12);
        let err = loan.activate(quote, TransactionId::new(), now()).unwrap_err();
        assert!(matches!(err, LoanError::InvalidStateTransition { .. }));
        assert_eq!(loan.status, LoanStatus::Pending);
    }

    #[test]
    fn test_repayments_advance_due_date_then_settle() {
        let mut loan = loan();
        loan.approve(now()).unwrap();
        let quote = amortization::compute_schedule(loan.principal, dec!(0), 12);
        loan.activate(quote, TransactionId::new(), now()).unwrap();
        assert_eq!(loan.next_payment_date, NaiveDate::from_ymd_opt(2024, 2, 15));

        assert!(!loan.apply_repayment(Money::from_major(100), now()).unwrap());
        assert_eq!(loan.next_payment_date, NaiveDate::from_ymd_opt(2024, 3, 15));

        assert!(loan.apply_repayment(Money::from_major(1_100), now()).unwrap());
        assert_eq!(loan.status, LoanStatus::Paid);
        assert_eq!(loan.remaining_balance(), Money::ZERO);
        assert!(loan.next_payment_date.is_none());
    }

    #[test]
    fn test_overdue_is_derived() {
        let mut loan = loan();
        loan.approve(now()).unwrap();
        let quote = amortization::compute_schedule(loan.principal, dec!(0), 12);
        loan.activate(quote, TransactionId::new(), now()).unwrap();

        let due = loan.next_payment_date.unwrap();
        assert_eq!(loan.display_status(due), LoanDisplayStatus::Active);
        assert_eq!(loan.display_status(due.succ_opt().unwrap()), LoanDisplayStatus::Overdue);
        assert_eq!(loan.status, LoanStatus::Active);
    }

    #[test]
    fn test_reject_only_before_disbursement() {
        let mut loan = loan();
        loan.close_unfunded(LoanStatus::Rejected, Some("income".into()), now()).unwrap();
        assert_eq!(loan.status, LoanStatus::Rejected);

        let err = loan
            .close_unfunded(LoanStatus::Cancelled, None, now())
            .unwrap_err();
        assert!(matches!(err, LoanError::InvalidStateTransition { .. }));
    }
}
