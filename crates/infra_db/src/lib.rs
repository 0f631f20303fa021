//! Infrastructure Database Layer
//!
//! PostgreSQL storage for the cooperative core, built on SQLx. The crate
//! implements the domain storage ports ([`domain_savings::LedgerRepository`]
//! and [`domain_loan::LoanRepository`]) so the services run unchanged against
//! either the in-memory adapters or the database.
//!
//! # Concurrency
//!
//! A unit of work is one database transaction. Row locks are taken with
//! `SELECT ... FOR UPDATE` in ascending id order and every wait is bounded by
//! `SET LOCAL lock_timeout`; a lock that is not granted surfaces as a
//! retryable `LockTimeout` domain error.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool_from_url, run_migrations, PostgresLedgerRepository};
//!
//! let pool = create_pool_from_url("postgres://localhost/coop").await?;
//! run_migrations(&pool).await?;
//! let ledger = PostgresLedgerRepository::new(pool.clone());
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{PostgresLedgerRepository, PostgresLoanRepository};
pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
