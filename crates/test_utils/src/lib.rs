//! Test Utilities Crate
//!
//! Shared test infrastructure for the cooperative savings and loans suites.
//!
//! # Modules
//!
//! - `fixtures`: Canonical amounts, dates and a fully wired in-memory harness
//! - `builders`: Builders for account and loan requests
//! - `database`: PostgreSQL testcontainer with the schema migrated
//! - `assertions`: Ledger consistency assertions
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
