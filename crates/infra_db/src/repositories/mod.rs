//! Row types and queries for the ledger and the loan book
//!
//! Functions here are thin: each maps one statement onto domain types and
//! leaves locking order and error translation to the adapters.

pub mod loans;
pub mod savings;

use sqlx::PgConnection;

use crate::error::DatabaseError;

/// Bounds every row-lock wait for the rest of the current transaction
pub async fn set_lock_timeout(conn: &mut PgConnection, millis: u64) -> Result<(), DatabaseError> {
    let statement = format!("SET LOCAL lock_timeout = '{}ms'", millis.max(1));
    sqlx::query(&statement).execute(conn).await?;
    Ok(())
}
