//! PostgreSQL adapters for the domain storage ports
//!
//! Each adapter opens one database transaction per unit of work, bounds row
//! lock waits with `SET LOCAL lock_timeout` and takes `SELECT ... FOR UPDATE`
//! locks in ascending id order. Dropping a unit of work without committing
//! rolls the transaction back.

pub mod ledger;
pub mod loans;

pub use ledger::PostgresLedgerRepository;
pub use loans::PostgresLoanRepository;

use std::time::Instant;

use chrono::Utc;
use sqlx::PgPool;

use core_kernel::{AdapterHealth, HealthCheckResult};

/// Round-trips `SELECT 1` and reports its latency
pub(crate) async fn ping(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = Instant::now();
    let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let (status, message) = match result {
        Ok(_) => (AdapterHealth::Healthy, None),
        Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
    };
    HealthCheckResult {
        adapter_id: adapter_id.to_string(),
        status,
        latency_ms,
        message,
        checked_at: Utc::now(),
    }
}
