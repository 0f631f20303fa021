//! Ledger storage port
//!
//! Every mutation runs inside a [`LedgerUnitOfWork`] opened for a fixed set
//! of accounts. Opening it takes a write lock on each account in ascending id
//! order; the locks are held until the unit of work is committed or dropped.
//! Dropping without `commit` discards every staged write.

use std::time::Duration;

use async_trait::async_trait;

use core_kernel::{DomainPort, HealthCheckable, SavingsAccountId, TransactionId};

use crate::account::SavingsAccount;
use crate::error::LedgerError;
use crate::transaction::{SavingsTransaction, TransactionType};

/// Repository for savings accounts and their postings
#[async_trait]
pub trait LedgerRepository: DomainPort + HealthCheckable {
    /// Locks the given accounts and opens a unit of work over them
    ///
    /// # Errors
    ///
    /// `LedgerError::LockTimeout` when any lock is not granted within `timeout`.
    async fn begin(
        &self,
        accounts: &[SavingsAccountId],
        timeout: Duration,
    ) -> Result<Box<dyn LedgerUnitOfWork>, LedgerError>;

    async fn find_account(&self, id: SavingsAccountId) -> Result<Option<SavingsAccount>, LedgerError>;

    async fn find_transaction(&self, id: TransactionId) -> Result<Option<SavingsTransaction>, LedgerError>;

    /// All postings of an account, oldest first
    async fn list_transactions(
        &self,
        account_id: SavingsAccountId,
    ) -> Result<Vec<SavingsTransaction>, LedgerError>;

    async fn account_number_exists(&self, account_number: &str) -> Result<bool, LedgerError>;
}

/// Atomic batch of ledger writes over a locked set of accounts
#[async_trait]
pub trait LedgerUnitOfWork: Send {
    /// Reads a locked account, including writes staged in this unit
    async fn account(&mut self, id: SavingsAccountId) -> Result<SavingsAccount, LedgerError>;

    async fn insert_account(&mut self, account: &SavingsAccount) -> Result<(), LedgerError>;

    async fn update_account(&mut self, account: &SavingsAccount) -> Result<(), LedgerError>;

    async fn transaction(&mut self, id: TransactionId) -> Result<Option<SavingsTransaction>, LedgerError>;

    /// Looks up the posting holding an idempotency key
    async fn find_by_reference(
        &mut self,
        account_id: SavingsAccountId,
        reference: &str,
        transaction_type: TransactionType,
    ) -> Result<Option<SavingsTransaction>, LedgerError>;

    /// The counter-posting of `original`, if one exists
    async fn find_reversal(
        &mut self,
        original: TransactionId,
    ) -> Result<Option<SavingsTransaction>, LedgerError>;

    async fn has_pending(&mut self, account_id: SavingsAccountId) -> Result<bool, LedgerError>;

    async fn insert_transaction(&mut self, transaction: &SavingsTransaction) -> Result<(), LedgerError>;

    async fn update_transaction(&mut self, transaction: &SavingsTransaction) -> Result<(), LedgerError>;

    /// Applies every staged write atomically and releases the locks
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}
