//! Request handlers, one module per resource

pub mod accounts;
pub mod health;
pub mod loans;
pub mod members;
pub mod transactions;

use validator::Validate;

use crate::error::ApiError;

/// Runs field validation on a request body
pub(crate) fn validated<T: Validate>(body: T) -> Result<T, ApiError> {
    body.validate()?;
    Ok(body)
}
