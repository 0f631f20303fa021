//! PostgreSQL Ledger Adapter
//!
//! Implements [`LedgerRepository`] over `savings_accounts` and
//! `savings_transactions`. A unit of work is one database transaction holding
//! row locks on its accounts; the `(account, reference, type)` unique
//! constraint backs the idempotency check made under those locks.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, SavingsAccountId, TransactionId};
use domain_savings::{
    LedgerError, LedgerRepository, LedgerUnitOfWork, SavingsAccount, SavingsTransaction,
    TransactionType,
};

use crate::error::DatabaseError;
use crate::repositories;
use crate::repositories::savings::{self as sql, REFERENCE_CONSTRAINT};

/// PostgreSQL-backed implementation of [`LedgerRepository`]
#[derive(Debug, Clone)]
pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DomainPort for PostgresLedgerRepository {}

#[async_trait]
impl HealthCheckable for PostgresLedgerRepository {
    async fn health_check(&self) -> HealthCheckResult {
        super::ping(&self.pool, "postgres-ledger").await
    }
}

/// Converts a database error, stamping lock timeouts with the configured wait
fn ledger_error(error: DatabaseError, waited_ms: u64) -> LedgerError {
    match error {
        DatabaseError::LockTimeout(resource) => LedgerError::LockTimeout { resource, waited_ms },
        other => other.into(),
    }
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    #[instrument(skip(self, accounts), fields(count = accounts.len()))]
    async fn begin(
        &self,
        accounts: &[SavingsAccountId],
        timeout: Duration,
    ) -> Result<Box<dyn LedgerUnitOfWork>, LedgerError> {
        let waited_ms = timeout.as_millis() as u64;
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;

        let mut ids: Vec<Uuid> = accounts.iter().copied().map(Uuid::from).collect();
        ids.sort();
        ids.dedup();

        repositories::set_lock_timeout(&mut tx, waited_ms)
            .await
            .map_err(|e| ledger_error(e, waited_ms))?;
        let locked = sql::lock_accounts(&mut tx, &ids)
            .await
            .map_err(|e| ledger_error(e, waited_ms))?;
        debug!(requested = ids.len(), existing = locked.len(), "Account rows locked");

        Ok(Box::new(PgLedgerUnitOfWork {
            tx,
            locked: accounts.iter().copied().collect(),
            waited_ms,
        }))
    }

    async fn find_account(&self, id: SavingsAccountId) -> Result<Option<SavingsAccount>, LedgerError> {
        Ok(sql::fetch_account(&self.pool, id.into()).await?)
    }

    async fn find_transaction(&self, id: TransactionId) -> Result<Option<SavingsTransaction>, LedgerError> {
        Ok(sql::fetch_transaction(&self.pool, id.into()).await?)
    }

    async fn list_transactions(
        &self,
        account_id: SavingsAccountId,
    ) -> Result<Vec<SavingsTransaction>, LedgerError> {
        Ok(sql::list_transactions(&self.pool, account_id.into()).await?)
    }

    async fn account_number_exists(&self, account_number: &str) -> Result<bool, LedgerError> {
        Ok(sql::account_number_exists(&self.pool, account_number).await?)
    }
}

struct PgLedgerUnitOfWork {
    tx: Transaction<'static, Postgres>,
    locked: HashSet<SavingsAccountId>,
    waited_ms: u64,
}

impl PgLedgerUnitOfWork {
    fn ensure_locked(&self, id: SavingsAccountId) -> Result<(), LedgerError> {
        if self.locked.contains(&id) {
            Ok(())
        } else {
            Err(LedgerError::Storage(format!(
                "{id} is not locked by this unit of work"
            )))
        }
    }

    fn map(&self, error: DatabaseError) -> LedgerError {
        ledger_error(error, self.waited_ms)
    }
}

#[async_trait]
impl LedgerUnitOfWork for PgLedgerUnitOfWork {
    async fn account(&mut self, id: SavingsAccountId) -> Result<SavingsAccount, LedgerError> {
        self.ensure_locked(id)?;
        sql::fetch_account(&mut *self.tx, id.into())
            .await
            .map_err(|e| self.map(e))?
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    async fn insert_account(&mut self, account: &SavingsAccount) -> Result<(), LedgerError> {
        self.ensure_locked(account.id)?;
        match sql::insert_account(&mut self.tx, account).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::DuplicateEntry(what)) => Err(LedgerError::validation(format!(
                "account {} already exists ({what})",
                account.account_number
            ))),
            Err(e) => Err(self.map(e)),
        }
    }

    async fn update_account(&mut self, account: &SavingsAccount) -> Result<(), LedgerError> {
        self.ensure_locked(account.id)?;
        match sql::update_account(&mut self.tx, account).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::NotFound(_)) => Err(LedgerError::account_not_found(account.id)),
            Err(e) => Err(self.map(e)),
        }
    }

    async fn transaction(&mut self, id: TransactionId) -> Result<Option<SavingsTransaction>, LedgerError> {
        sql::fetch_transaction(&mut *self.tx, id.into())
            .await
            .map_err(|e| self.map(e))
    }

    async fn find_by_reference(
        &mut self,
        account_id: SavingsAccountId,
        reference: &str,
        transaction_type: TransactionType,
    ) -> Result<Option<SavingsTransaction>, LedgerError> {
        sql::find_by_reference(&mut self.tx, account_id.into(), reference, transaction_type)
            .await
            .map_err(|e| self.map(e))
    }

    async fn find_reversal(
        &mut self,
        original: TransactionId,
    ) -> Result<Option<SavingsTransaction>, LedgerError> {
        sql::find_reversal(&mut self.tx, original.into())
            .await
            .map_err(|e| self.map(e))
    }

    async fn has_pending(&mut self, account_id: SavingsAccountId) -> Result<bool, LedgerError> {
        sql::has_pending(&mut self.tx, account_id.into())
            .await
            .map_err(|e| self.map(e))
    }

    async fn insert_transaction(&mut self, transaction: &SavingsTransaction) -> Result<(), LedgerError> {
        self.ensure_locked(transaction.account_id)?;
        match sql::insert_transaction(&mut self.tx, transaction).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::DuplicateEntry(constraint)) if constraint == REFERENCE_CONSTRAINT => {
                Err(LedgerError::DuplicateReference {
                    account_id: transaction.account_id,
                    reference: transaction.reference_number.clone().unwrap_or_default(),
                    transaction_type: transaction.transaction_type,
                })
            }
            Err(e) => Err(self.map(e)),
        }
    }

    async fn update_transaction(&mut self, transaction: &SavingsTransaction) -> Result<(), LedgerError> {
        self.ensure_locked(transaction.account_id)?;
        match sql::update_transaction(&mut self.tx, transaction).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::NotFound(_)) => Err(LedgerError::transaction_not_found(transaction.id)),
            Err(e) => Err(self.map(e)),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let this = *self;
        let waited_ms = this.waited_ms;
        this.tx
            .commit()
            .await
            .map_err(|e| ledger_error(DatabaseError::from(e), waited_ms))
    }
}
