//! Loan domain errors

use thiserror::Error;

use core_kernel::{CoreError, LoanId, MemberId, MoneyError};
use domain_savings::LedgerError;

use crate::exposure::ExposureReason;
use crate::loan::LoanStatus;

/// Errors that can occur in the loan domain
#[derive(Debug, Error)]
pub enum LoanError {
    /// Malformed application or request
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The loan is not in a status that permits the action
    #[error("Cannot {action} loan {loan_id} in status {from:?}")]
    InvalidStateTransition {
        loan_id: LoanId,
        from: LoanStatus,
        action: &'static str,
    },

    /// A guarantor is over one of the exposure caps
    #[error("Guarantor {guarantor} exposure exceeded: {reason}")]
    GuarantorExposureExceeded {
        guarantor: MemberId,
        reason: ExposureReason,
    },

    /// Repayment reference reused with a different amount
    #[error("Repayment reference '{reference}' already used on loan {loan_id}")]
    DuplicateRepayment { loan_id: LoanId, reference: String },

    #[error("Lock timeout on {resource} after {waited_ms}ms")]
    LockTimeout { resource: String, waited_ms: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    /// Failure from the savings ledger, passed through unchanged
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl LoanError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn loan_not_found(id: LoanId) -> Self {
        Self::NotFound {
            entity: "Loan",
            id: id.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LockTimeout { .. } => true,
            Self::Ledger(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::GuarantorExposureExceeded { .. } => "GUARANTOR_EXPOSURE_EXCEEDED",
            Self::DuplicateRepayment { .. } => "DUPLICATE_REFERENCE",
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Ledger(inner) => inner.code(),
        }
    }
}

impl From<MoneyError> for LoanError {
    fn from(err: MoneyError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<CoreError> for LoanError {
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
            CoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            CoreError::InvalidStateTransition(msg) => Self::Storage(msg),
        }
    }
}
