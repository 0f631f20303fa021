//! Savings Domain - Member Savings Ledger
//!
//! This crate keeps each member savings account's stored balance consistent
//! with its posting history under concurrent access.
//!
//! # Account Lifecycle
//!
//! ```text
//!   Active ──► Inactive ──► Closed
//!     │  ▲         │
//!     ▼  │         ▼
//!   Suspended ──► Closed
//!     │
//!   Active ──► Matured ──► Closed   (fixed deposits)
//! ```
//!
//! # Posting Rules
//!
//! - Credits: deposit, interest, transfer-in, adjustment
//! - Debits: withdrawal, fee, transfer-out
//! - Debits and amounts above the approval threshold are held as pending
//!   unless pre-approved
//! - Reversals post a counter-entry; history is never edited in place
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_savings::{LedgerStore, PostRequest};
//!
//! let tx = store
//!     .post(PostRequest::deposit(account_id, Money::from_major(100)).with_reference("DEP-1"))
//!     .await?;
//! ```

pub mod account;
pub mod transaction;
pub mod ledger;
pub mod config;
pub mod ports;
pub mod memory;
pub mod error;

pub use account::{
    AccountStatus, AccountType, InterestPeriod, OpenAccountRequest, SavingsAccount,
    StatusPermissions,
};
pub use transaction::{
    AccountStatement, PaymentMethod, PostRequest, SavingsTransaction, TransactionStatus,
    TransactionType, TransferReceipt, TransferRequest,
};
pub use ledger::LedgerStore;
pub use config::LedgerConfig;
pub use ports::{LedgerRepository, LedgerUnitOfWork};
pub use memory::InMemoryLedgerRepository;
pub use error::LedgerError;
