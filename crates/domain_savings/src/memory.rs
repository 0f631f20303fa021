//! In-memory ledger adapter
//!
//! Single-process stand-in for the PostgreSQL adapter. Account locks come from
//! a [`KeyedLocks`] registry, writes are staged per unit of work and applied
//! under one write guard on commit, so readers never observe a half-applied
//! posting.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use core_kernel::{
    DomainPort, HealthCheckResult, HealthCheckable, KeyedLocks, LockSet, SavingsAccountId,
    TransactionId,
};

use crate::account::SavingsAccount;
use crate::error::LedgerError;
use crate::ports::{LedgerRepository, LedgerUnitOfWork};
use crate::transaction::{SavingsTransaction, TransactionStatus, TransactionType};

type ReferenceKey = (SavingsAccountId, String, TransactionType);

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<SavingsAccountId, SavingsAccount>,
    account_numbers: HashSet<String>,
    transactions: HashMap<TransactionId, SavingsTransaction>,
    /// Posting ids per account in insertion order
    history: HashMap<SavingsAccountId, Vec<TransactionId>>,
    references: HashMap<ReferenceKey, TransactionId>,
    /// original id -> counter-posting id
    reversals: HashMap<TransactionId, TransactionId>,
}

/// In-memory implementation of [`LedgerRepository`]
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedgerRepository {
    state: Arc<RwLock<LedgerState>>,
    locks: Arc<KeyedLocks<SavingsAccountId>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored postings across all accounts
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

impl DomainPort for InMemoryLedgerRepository {}

#[async_trait]
impl HealthCheckable for InMemoryLedgerRepository {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("memory-ledger")
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn begin(
        &self,
        accounts: &[SavingsAccountId],
        timeout: Duration,
    ) -> Result<Box<dyn LedgerUnitOfWork>, LedgerError> {
        let locks = self.locks.acquire(accounts, timeout).await?;

        Ok(Box::new(MemoryUnitOfWork {
            state: Arc::clone(&self.state),
            locked: accounts.iter().copied().collect(),
            _locks: locks,
            accounts: HashMap::new(),
            new_accounts: Vec::new(),
            transactions: HashMap::new(),
            new_transactions: Vec::new(),
        }))
    }

    async fn find_account(&self, id: SavingsAccountId) -> Result<Option<SavingsAccount>, LedgerError> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn find_transaction(&self, id: TransactionId) -> Result<Option<SavingsTransaction>, LedgerError> {
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn list_transactions(
        &self,
        account_id: SavingsAccountId,
    ) -> Result<Vec<SavingsTransaction>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .history
            .get(&account_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.transactions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn account_number_exists(&self, account_number: &str) -> Result<bool, LedgerError> {
        Ok(self.state.read().await.account_numbers.contains(account_number))
    }
}

struct MemoryUnitOfWork {
    state: Arc<RwLock<LedgerState>>,
    locked: HashSet<SavingsAccountId>,
    _locks: LockSet,
    accounts: HashMap<SavingsAccountId, SavingsAccount>,
    new_accounts: Vec<SavingsAccountId>,
    transactions: HashMap<TransactionId, SavingsTransaction>,
    new_transactions: Vec<TransactionId>,
}

impl MemoryUnitOfWork {
    fn ensure_locked(&self, id: SavingsAccountId) -> Result<(), LedgerError> {
        if self.locked.contains(&id) {
            Ok(())
        } else {
            Err(LedgerError::Storage(format!(
                "{id} is not locked by this unit of work"
            )))
        }
    }

    async fn account_exists(&self, id: SavingsAccountId) -> bool {
        self.accounts.contains_key(&id) || self.state.read().await.accounts.contains_key(&id)
    }

    async fn transaction_exists(&self, id: TransactionId) -> bool {
        self.transactions.contains_key(&id) || self.state.read().await.transactions.contains_key(&id)
    }
}

#[async_trait]
impl LedgerUnitOfWork for MemoryUnitOfWork {
    async fn account(&mut self, id: SavingsAccountId) -> Result<SavingsAccount, LedgerError> {
        self.ensure_locked(id)?;
        if let Some(account) = self.accounts.get(&id) {
            return Ok(account.clone());
        }
        self.state
            .read()
            .await
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    async fn insert_account(&mut self, account: &SavingsAccount) -> Result<(), LedgerError> {
        self.ensure_locked(account.id)?;
        if self.account_exists(account.id).await {
            return Err(LedgerError::validation(format!("account {} already exists", account.id)));
        }
        self.accounts.insert(account.id, account.clone());
        self.new_accounts.push(account.id);
        Ok(())
    }

    async fn update_account(&mut self, account: &SavingsAccount) -> Result<(), LedgerError> {
        self.ensure_locked(account.id)?;
        if !self.account_exists(account.id).await {
            return Err(LedgerError::account_not_found(account.id));
        }
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn transaction(&mut self, id: TransactionId) -> Result<Option<SavingsTransaction>, LedgerError> {
        if let Some(tx) = self.transactions.get(&id) {
            return Ok(Some(tx.clone()));
        }
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn find_by_reference(
        &mut self,
        account_id: SavingsAccountId,
        reference: &str,
        transaction_type: TransactionType,
    ) -> Result<Option<SavingsTransaction>, LedgerError> {
        let staged = self.transactions.values().find(|tx| {
            tx.account_id == account_id
                && tx.transaction_type == transaction_type
                && tx.reference_number.as_deref() == Some(reference)
        });
        if let Some(tx) = staged {
            return Ok(Some(tx.clone()));
        }

        let state = self.state.read().await;
        let key = (account_id, reference.to_string(), transaction_type);
        Ok(state
            .references
            .get(&key)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn find_reversal(
        &mut self,
        original: TransactionId,
    ) -> Result<Option<SavingsTransaction>, LedgerError> {
        if let Some(tx) = self.transactions.values().find(|tx| tx.reversal_of == Some(original)) {
            return Ok(Some(tx.clone()));
        }
        let state = self.state.read().await;
        Ok(state
            .reversals
            .get(&original)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn has_pending(&mut self, account_id: SavingsAccountId) -> Result<bool, LedgerError> {
        let is_pending = |tx: &SavingsTransaction| {
            tx.account_id == account_id && tx.status == TransactionStatus::Pending
        };
        if self.transactions.values().any(is_pending) {
            return Ok(true);
        }

        let state = self.state.read().await;
        let pending = state
            .history
            .get(&account_id)
            .into_iter()
            .flatten()
            .filter(|id| !self.transactions.contains_key(*id))
            .filter_map(|id| state.transactions.get(id))
            .any(is_pending);
        Ok(pending)
    }

    async fn insert_transaction(&mut self, transaction: &SavingsTransaction) -> Result<(), LedgerError> {
        self.ensure_locked(transaction.account_id)?;
        if let Some(reference) = transaction.reference_number.as_deref() {
            let clash = self
                .find_by_reference(transaction.account_id, reference, transaction.transaction_type)
                .await?;
            if clash.is_some() {
                return Err(LedgerError::DuplicateReference {
                    account_id: transaction.account_id,
                    reference: reference.to_string(),
                    transaction_type: transaction.transaction_type,
                });
            }
        }
        self.transactions.insert(transaction.id, transaction.clone());
        self.new_transactions.push(transaction.id);
        Ok(())
    }

    async fn update_transaction(&mut self, transaction: &SavingsTransaction) -> Result<(), LedgerError> {
        self.ensure_locked(transaction.account_id)?;
        if !self.transaction_exists(transaction.id).await {
            return Err(LedgerError::transaction_not_found(transaction.id));
        }
        self.transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let this = *self;
        let mut state = this.state.write().await;

        for id in &this.new_accounts {
            if let Some(account) = this.accounts.get(id) {
                if state.account_numbers.contains(&account.account_number) {
                    return Err(LedgerError::validation(format!(
                        "account number {} already exists",
                        account.account_number
                    )));
                }
            }
        }

        for (id, account) in this.accounts {
            state.account_numbers.insert(account.account_number.clone());
            state.accounts.insert(id, account);
        }

        for id in &this.new_transactions {
            if let Some(tx) = this.transactions.get(id) {
                state.history.entry(tx.account_id).or_default().push(tx.id);
                if let Some(reference) = tx.reference_number.clone() {
                    state
                        .references
                        .insert((tx.account_id, reference, tx.transaction_type), tx.id);
                }
                if let Some(original) = tx.reversal_of {
                    state.reversals.insert(original, tx.id);
                }
            }
        }
        for (id, tx) in this.transactions {
            state.transactions.insert(id, tx);
        }

        Ok(())
    }
}
