//! Request and response bodies
//!
//! Requests are validated with `validator` before they reach a service;
//! responses are mostly the domain types themselves.

pub mod accounts;
pub mod loans;

use rust_decimal::Decimal;
use validator::ValidationError;

pub(crate) fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_positive() && !value.is_zero() {
        Ok(())
    } else {
        Err(ValidationError::new("positive").with_message("must be greater than zero".into()))
    }
}
