//! Core Kernel - Foundational types for the cooperative savings and loans core
//!
//! This crate provides the building blocks shared by the ledger and the loan
//! domains:
//! - Money and rates with exact decimal arithmetic (never floating point)
//! - Strongly-typed identifiers
//! - An injectable clock for "today"-dependent rules
//! - Keyed lock registry used by single-writer adapters
//! - Port marker traits and health checks

pub mod money;
pub mod identifiers;
pub mod clock;
pub mod locks;
pub mod ports;
pub mod error;

pub use money::{Money, Rate, MoneyError};
pub use identifiers::{MemberId, SavingsAccountId, TransactionId, LoanId, GuarantorId, RepaymentId};
pub use clock::{Clock, SystemClock, FixedClock};
pub use locks::{KeyedLocks, LockSet};
pub use ports::{DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth};
pub use error::CoreError;
