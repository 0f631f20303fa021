//! API error handling
//!
//! Domain errors keep their machine-readable code on the wire; the HTTP
//! status only groups them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use domain_loan::LoanError;
use domain_savings::LedgerError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Request body failed field validation
    #[error("Validation error: {}", .0.join("; "))]
    InvalidFields(Vec<String>),

    /// Request conflicts with the current state of an account or loan
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// A lock was not granted in time; the same request may be retried
    #[error("{message}")]
    Busy { code: &'static str, message: String },

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) | ApiError::InvalidFields(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Validation(_) | ApiError::InvalidFields(_) => "VALIDATION_ERROR",
            ApiError::Conflict { code, .. } | ApiError::Busy { code, .. } => *code,
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Groups a domain error code into a status-bearing variant
    fn from_domain(code: &'static str, retryable: bool, message: String) -> Self {
        match code {
            "VALIDATION_ERROR" => ApiError::Validation(message),
            "NOT_FOUND" => ApiError::NotFound(message),
            "STORAGE_ERROR" => ApiError::Internal(message),
            _ if retryable => ApiError::Busy { code, message },
            _ => ApiError::Conflict { code, message },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && !matches!(self, ApiError::Busy { .. }) {
            error!(error = %self, "Request failed");
        }

        let details = match &self {
            ApiError::InvalidFields(fields) => Some(fields.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            retryable: matches!(self, ApiError::Busy { .. }),
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::from_domain(err.code(), err.is_retryable(), err.to_string())
    }
}

impl From<LoanError> for ApiError {
    fn from(err: LoanError) -> Self {
        ApiError::from_domain(err.code(), err.is_retryable(), err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{field}: {message}"),
                    None => format!("{field}: {}", e.code),
                })
            })
            .collect();
        messages.sort();
        ApiError::InvalidFields(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Money, SavingsAccountId};

    #[test]
    fn test_lock_timeout_is_retryable_503() {
        let err: ApiError = LedgerError::LockTimeout {
            resource: "savings_accounts".into(),
            waited_ms: 5_000,
        }
        .into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "LOCK_TIMEOUT");
    }

    #[test]
    fn test_business_refusals_are_conflicts() {
        let err: ApiError = LedgerError::InsufficientFunds {
            account_id: SavingsAccountId::new(),
            balance: Money::from_major(10),
            requested: Money::from_major(20),
            floor: Money::ZERO,
        }
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
    }

    #[test]
    fn test_wrapped_ledger_error_keeps_its_code() {
        let err: ApiError = LoanError::from(LedgerError::validation("bad amount")).into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_storage_failure_is_internal() {
        let err: ApiError = LoanError::Storage("connection reset".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
