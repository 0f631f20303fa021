//! Ledger postings
//!
//! A [`SavingsTransaction`] is one row of an account's history. Completed rows
//! carry the balance immediately before and after they were applied, so the
//! history of an account can be replayed and checked row by row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{MemberId, Money, SavingsAccountId, TransactionId};

/// Kind of posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Interest,
    Fee,
    TransferIn,
    TransferOut,
    /// Manual correction; always a credit
    Adjustment,
}

impl TransactionType {
    /// Credits raise the balance, debits lower it
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionType::Deposit
                | TransactionType::Interest
                | TransactionType::TransferIn
                | TransactionType::Adjustment
        )
    }

    pub fn is_debit(&self) -> bool {
        !self.is_credit()
    }

    /// Signed balance effect of `amount` before fees
    pub fn signed(&self, amount: Money) -> Money {
        if self.is_credit() {
            amount
        } else {
            -amount
        }
    }

    /// The type that undoes this one, if it can be reversed
    pub fn reversal_counterpart(&self) -> Option<TransactionType> {
        match self {
            TransactionType::Deposit => Some(TransactionType::Withdrawal),
            TransactionType::Withdrawal => Some(TransactionType::Deposit),
            TransactionType::TransferIn => Some(TransactionType::TransferOut),
            TransactionType::TransferOut => Some(TransactionType::TransferIn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Interest => "interest",
            TransactionType::Fee => "fee",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deposit" => Some(TransactionType::Deposit),
            "withdrawal" => Some(TransactionType::Withdrawal),
            "interest" => Some(TransactionType::Interest),
            "fee" => Some(TransactionType::Fee),
            "transfer_in" => Some(TransactionType::TransferIn),
            "transfer_out" => Some(TransactionType::TransferOut),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }
}

/// Posting status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting approval; has not touched the balance
    Pending,
    Completed,
    Failed,
    /// Undone by a counter-posting
    Reversed,
    Cancelled,
}

impl TransactionStatus {
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Pending, Cancelled) | (Completed, Reversed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Reversed => "reversed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            "reversed" => Some(TransactionStatus::Reversed),
            "cancelled" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }
}

/// How the money moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    BankTransfer,
    MobileMoney,
    Cheque,
    SalaryDeduction,
    /// Movement generated by the system itself (transfers, interest, loans)
    Internal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Cheque => "cheque",
            PaymentMethod::SalaryDeduction => "salary_deduction",
            PaymentMethod::Internal => "internal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cash" => Some(PaymentMethod::Cash),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "mobile_money" => Some(PaymentMethod::MobileMoney),
            "cheque" => Some(PaymentMethod::Cheque),
            "salary_deduction" => Some(PaymentMethod::SalaryDeduction),
            "internal" => Some(PaymentMethod::Internal),
            _ => None,
        }
    }
}

/// A posting against a savings account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsTransaction {
    pub id: TransactionId,
    pub account_id: SavingsAccountId,
    pub member_id: MemberId,
    pub transaction_type: TransactionType,
    /// Always positive; direction comes from the type
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub payment_method: PaymentMethod,
    /// Idempotency key, unique per account and type
    pub reference_number: Option<String>,
    pub description: Option<String>,
    pub status: TransactionStatus,
    pub fees_charged: Money,
    pub requires_approval: bool,
    /// Set when a debit was authorized to dip below the minimum balance
    pub overdraft_authorized: bool,
    /// The posting this one reverses
    pub reversal_of: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SavingsTransaction {
    /// Signed effect on the balance, fees included
    pub fn net_effect(&self) -> Money {
        self.transaction_type.signed(self.amount) - self.fees_charged
    }

    /// Whether the recorded before/after balances agree with the net effect
    pub fn is_consistent(&self) -> bool {
        self.balance_after == self.balance_before + self.net_effect()
    }

    /// Whether a resubmission with these figures is the same request
    pub fn matches_figures(&self, amount: Money, fees: Money) -> bool {
        self.amount == amount && self.fees_charged == fees
    }

    pub fn is_reversal(&self) -> bool {
        self.reversal_of.is_some()
    }
}

/// Request to post a single transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRequest {
    pub account_id: SavingsAccountId,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub fees_charged: Money,
    pub payment_method: PaymentMethod,
    pub reference_number: Option<String>,
    pub description: Option<String>,
    /// Lowers the debit floor from the minimum balance to zero
    pub allow_overdraft: bool,
    /// Skips the approval hold
    pub pre_approved: bool,
}

impl PostRequest {
    pub fn new(account_id: SavingsAccountId, transaction_type: TransactionType, amount: Money) -> Self {
        Self {
            account_id,
            transaction_type,
            amount,
            fees_charged: Money::ZERO,
            payment_method: PaymentMethod::Cash,
            reference_number: None,
            description: None,
            allow_overdraft: false,
            pre_approved: false,
        }
    }

    pub fn deposit(account_id: SavingsAccountId, amount: Money) -> Self {
        Self::new(account_id, TransactionType::Deposit, amount)
    }

    pub fn withdrawal(account_id: SavingsAccountId, amount: Money) -> Self {
        Self::new(account_id, TransactionType::Withdrawal, amount)
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_number = Some(reference.into());
        self
    }

    pub fn with_fees(mut self, fees: Money) -> Self {
        self.fees_charged = fees;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    pub fn pre_approved(mut self) -> Self {
        self.pre_approved = true;
        self
    }

    pub fn allow_overdraft(mut self) -> Self {
        self.allow_overdraft = true;
        self
    }

    /// Normalized reference: trimmed, empty treated as absent
    pub fn reference(&self) -> Option<&str> {
        self.reference_number
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// Request to move money between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account: SavingsAccountId,
    pub to_account: SavingsAccountId,
    pub amount: Money,
    /// Charged on the outgoing leg
    pub fees_charged: Money,
    pub reference_number: Option<String>,
    pub description: Option<String>,
}

/// Both legs of a completed transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub outgoing: SavingsTransaction,
    pub incoming: SavingsTransaction,
}

/// An account's history over a window, with opening and closing balances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStatement {
    pub account_id: SavingsAccountId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub opening_balance: Money,
    pub closing_balance: Money,
    pub total_credits: Money,
    pub total_debits: Money,
    pub transactions: Vec<SavingsTransaction>,
}
