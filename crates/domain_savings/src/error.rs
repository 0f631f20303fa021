//! Savings ledger errors

use thiserror::Error;

use core_kernel::{CoreError, Money, MoneyError, SavingsAccountId, TransactionId};

use crate::account::AccountStatus;
use crate::transaction::TransactionType;

/// Errors raised by the ledger store and its repositories
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input: non-positive amount, negative fees, bad dates
    #[error("Validation error: {0}")]
    Validation(String),

    /// A debit would take the account below its floor
    #[error("Insufficient funds in {account_id}: balance {balance}, requested {requested}, floor {floor}")]
    InsufficientFunds {
        account_id: SavingsAccountId,
        balance: Money,
        requested: Money,
        floor: Money,
    },

    /// Account status (or maturity lock) forbids this posting
    #[error("Account {account_id} ({status:?}) does not allow {operation}")]
    AccountNotPostable {
        account_id: SavingsAccountId,
        status: AccountStatus,
        operation: String,
    },

    /// Same reference already used on this account for this type with different figures
    #[error("Duplicate reference '{reference}' for {transaction_type:?} on {account_id}")]
    DuplicateReference {
        account_id: SavingsAccountId,
        reference: String,
        transaction_type: TransactionType,
    },

    /// Transaction cannot be reversed
    #[error("Transaction {transaction_id} is not reversible: {reason}")]
    NotReversible {
        transaction_id: TransactionId,
        reason: String,
    },

    /// Row lock could not be obtained in time
    #[error("Lock timeout on {resource} after {waited_ms}ms")]
    LockTimeout { resource: String, waited_ms: u64 },

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Status change not permitted from the current status
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn account_not_found(id: SavingsAccountId) -> Self {
        Self::NotFound {
            entity: "Savings account",
            id: id.to_string(),
        }
    }

    pub fn transaction_not_found(id: TransactionId) -> Self {
        Self::NotFound {
            entity: "Transaction",
            id: id.to_string(),
        }
    }

    /// Lock timeouts are the only failure a caller should retry as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::AccountNotPostable { .. } => "ACCOUNT_NOT_POSTABLE",
            Self::DuplicateReference { .. } => "DUPLICATE_REFERENCE",
            Self::NotReversible { .. } => "NOT_REVERSIBLE",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<MoneyError> for LedgerError {
    fn from(err: MoneyError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::LockTimeout {
                resource,
                waited_ms,
            } => Self::LockTimeout {
                resource,
                waited_ms,
            },
            CoreError::Money(e) => e.into(),
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::InvalidStateTransition(msg) => Self::InvalidStateTransition(msg),
            CoreError::NotFound { entity, id } => Self::NotFound { entity, id },
        }
    }
}
