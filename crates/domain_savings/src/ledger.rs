//! Balance-consistent savings ledger
//!
//! [`LedgerStore`] is the only component that changes an account balance.
//! Every mutation follows the same shape:
//!
//! 1. lock the affected accounts (ascending id order, bounded wait)
//! 2. re-read them under the lock
//! 3. validate status, floor and idempotency rules
//! 4. stage the posting and the new balance
//! 5. commit both atomically
//!
//! # Invariants
//!
//! - For every completed posting, `balance_after = balance_before + net effect`
//! - An account balance equals the sum of the net effects of its completed
//!   postings (reversals included)
//! - No debit takes a balance below its floor
//! - `(account, reference, type)` identifies at most one posting

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use core_kernel::{Clock, Money, SavingsAccountId, TransactionId};

use crate::account::{AccountStatus, AccountType, OpenAccountRequest, SavingsAccount};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::ports::{LedgerRepository, LedgerUnitOfWork};
use crate::transaction::{
    AccountStatement, PaymentMethod, PostRequest, SavingsTransaction, TransactionStatus,
    TransactionType, TransferReceipt, TransferRequest,
};

const ACCOUNT_NUMBER_ATTEMPTS: usize = 8;

/// The savings ledger service
pub struct LedgerStore {
    repository: Arc<dyn LedgerRepository>,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
}

impl LedgerStore {
    /// Creates a ledger store over a repository
    ///
    /// # Arguments
    ///
    /// * `repository` - Storage adapter (in-memory or PostgreSQL)
    /// * `config` - Approval threshold, lock timeout and floor policy
    /// * `clock` - Source of "now" for timestamps and maturity checks
    pub fn new(
        repository: Arc<dyn LedgerRepository>,
        config: LedgerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn LedgerRepository> {
        &self.repository
    }

    async fn begin(
        &self,
        accounts: &[SavingsAccountId],
    ) -> Result<Box<dyn LedgerUnitOfWork>, LedgerError> {
        self.repository
            .begin(accounts, self.config.lock_timeout())
            .await
            .inspect_err(|e| {
                if e.is_retryable() {
                    warn!(?accounts, error = %e, "Ledger lock not granted");
                }
            })
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Opens a new account, posting any opening balance as a deposit
    ///
    /// # Errors
    ///
    /// `LedgerError::Validation` when the request breaks a product rule.
    #[instrument(skip(self, request), fields(member_id = %request.member_id, account_type = ?request.account_type))]
    pub async fn open_account(&self, request: OpenAccountRequest) -> Result<SavingsAccount, LedgerError> {
        let now = self.clock.now();
        let account_number = self.allocate_account_number(request.account_type).await?;
        let account = SavingsAccount::open(&request, account_number, now)?;

        let mut uow = self.begin(&[account.id]).await?;
        uow.insert_account(&account).await?;

        if request.opening_balance.is_positive() {
            let opening = PostRequest::deposit(account.id, request.opening_balance)
                .with_reference(format!("OPENING-{}", account.account_number))
                .with_description("Opening balance")
                .pre_approved();
            self.post_within(uow.as_mut(), &opening, now).await?;
        }

        let account = uow.account(account.id).await?;
        uow.commit().await?;

        info!(
            account_id = %account.id,
            account_number = %account.account_number,
            balance = %account.balance,
            "Savings account opened"
        );
        Ok(account)
    }

    async fn allocate_account_number(&self, account_type: AccountType) -> Result<String, LedgerError> {
        for _ in 0..ACCOUNT_NUMBER_ATTEMPTS {
            let digits = uuid::Uuid::new_v4().as_u128() % 100_000_000;
            let candidate = format!("SAV-{}-{:08}", account_type.code(), digits);
            if !self.repository.account_number_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(LedgerError::Storage(
            "could not allocate a unique account number".to_string(),
        ))
    }

    /// Closes an account if its status allows it, its balance is zero and
    /// nothing is awaiting approval
    ///
    /// Returns `false` without changing anything when the account cannot be
    /// closed.
    #[instrument(skip(self))]
    pub async fn close_account(&self, account_id: SavingsAccountId) -> Result<bool, LedgerError> {
        let mut uow = self.begin(&[account_id]).await?;
        let mut account = uow.account(account_id).await?;

        if !account.can_be_closed() || uow.has_pending(account_id).await? {
            debug!(status = ?account.status, balance = %account.balance, "Account not closable");
            return Ok(false);
        }

        let now = self.clock.now();
        account.status = AccountStatus::Closed;
        account.closed_at = Some(now);
        account.updated_at = now;
        uow.update_account(&account).await?;
        uow.commit().await?;

        info!(%account_id, "Savings account closed");
        Ok(true)
    }

    /// Administrative status change (suspend, reactivate, mark dormant, mature)
    ///
    /// Closing goes through [`LedgerStore::close_account`] so its balance
    /// checks always apply.
    #[instrument(skip(self))]
    pub async fn set_account_status(
        &self,
        account_id: SavingsAccountId,
        status: AccountStatus,
    ) -> Result<SavingsAccount, LedgerError> {
        if status == AccountStatus::Closed {
            return Err(LedgerError::validation("use close_account to close an account"));
        }

        let mut uow = self.begin(&[account_id]).await?;
        let mut account = uow.account(account_id).await?;

        if !account.status.can_transition_to(status) {
            return Err(LedgerError::InvalidStateTransition(format!(
                "account {} cannot move from {:?} to {:?}",
                account_id, account.status, status
            )));
        }
        if status == AccountStatus::Matured && account.account_type != AccountType::Fixed {
            return Err(LedgerError::validation("only fixed accounts can mature"));
        }

        account.status = status;
        account.updated_at = self.clock.now();
        uow.update_account(&account).await?;
        uow.commit().await?;

        info!(%account_id, ?status, "Account status changed");
        Ok(account)
    }

    // ------------------------------------------------------------------
    // Postings
    // ------------------------------------------------------------------

    /// Posts one transaction
    ///
    /// A resubmission with the same `(account, reference, type)` and the same
    /// amount and fees returns the existing posting unchanged. Postings above
    /// the approval threshold, and all debits, are held as `Pending` unless
    /// the request is pre-approved; a pending posting does not touch the
    /// balance.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive amount or negative fees
    /// - `AccountNotPostable` when the status or maturity lock forbids it
    /// - `InsufficientFunds` when the result would fall below the floor
    /// - `DuplicateReference` for a reused key with different figures
    /// - `LockTimeout` when the account lock is not granted in time
    #[instrument(
        skip(self, request),
        fields(
            account_id = %request.account_id,
            transaction_type = ?request.transaction_type,
            amount = %request.amount
        )
    )]
    pub async fn post(&self, request: PostRequest) -> Result<SavingsTransaction, LedgerError> {
        let mut uow = self.begin(&[request.account_id]).await?;
        let now = self.clock.now();
        let transaction = self.post_within(uow.as_mut(), &request, now).await?;
        uow.commit().await?;
        Ok(transaction)
    }

    /// Posting logic shared by every caller holding the account lock
    async fn post_within(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        request: &PostRequest,
        now: DateTime<Utc>,
    ) -> Result<SavingsTransaction, LedgerError> {
        if !request.amount.is_positive() {
            return Err(LedgerError::validation("amount must be positive"));
        }
        if request.fees_charged.is_negative() {
            return Err(LedgerError::validation("fees cannot be negative"));
        }

        let reference = request.reference().map(str::to_string);
        if let Some(reference) = reference.as_deref() {
            if let Some(existing) = uow
                .find_by_reference(request.account_id, reference, request.transaction_type)
                .await?
            {
                if existing.matches_figures(request.amount, request.fees_charged) {
                    debug!(transaction_id = %existing.id, reference, "Idempotent replay");
                    return Ok(existing);
                }
                return Err(LedgerError::DuplicateReference {
                    account_id: request.account_id,
                    reference: reference.to_string(),
                    transaction_type: request.transaction_type,
                });
            }
        }

        let mut account = uow.account(request.account_id).await?;
        self.ensure_postable(&account, request.transaction_type, now)?;

        let balance_before = account.balance;
        let net = request
            .transaction_type
            .signed(request.amount)
            .checked_sub(&request.fees_charged)?;
        let balance_after = balance_before.checked_add(&net)?;
        self.ensure_above_floor(&account, request.transaction_type, request.allow_overdraft, net, balance_after)?;

        let requires_approval =
            request.amount > self.config.approval_threshold || request.transaction_type.is_debit();
        let held = requires_approval && !request.pre_approved;

        let transaction = SavingsTransaction {
            id: TransactionId::new_v7(),
            account_id: account.id,
            member_id: account.member_id,
            transaction_type: request.transaction_type,
            amount: request.amount,
            balance_before,
            balance_after,
            payment_method: request.payment_method,
            reference_number: reference,
            description: request.description.clone(),
            status: if held {
                TransactionStatus::Pending
            } else {
                TransactionStatus::Completed
            },
            fees_charged: request.fees_charged,
            requires_approval,
            overdraft_authorized: request.allow_overdraft,
            reversal_of: None,
            created_at: now,
            completed_at: if held { None } else { Some(now) },
        };

        if !held {
            account.balance = balance_after;
            account.updated_at = now;
            uow.update_account(&account).await?;
        }
        uow.insert_transaction(&transaction).await?;

        info!(
            transaction_id = %transaction.id,
            account_id = %account.id,
            status = ?transaction.status,
            balance_after = %transaction.balance_after,
            "Transaction recorded"
        );
        Ok(transaction)
    }

    fn ensure_postable(
        &self,
        account: &SavingsAccount,
        transaction_type: TransactionType,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let permissions = account.permissions();
        let allowed = if transaction_type.is_credit() {
            permissions.allows_deposits
        } else {
            permissions.allows_withdrawals
        };
        if !allowed {
            return Err(LedgerError::AccountNotPostable {
                account_id: account.id,
                status: account.status,
                operation: transaction_type.as_str().to_string(),
            });
        }

        let maturity_locked = matches!(
            transaction_type,
            TransactionType::Withdrawal | TransactionType::TransferOut
        ) && account.is_locked_until_maturity(now.date_naive());
        if maturity_locked {
            return Err(LedgerError::AccountNotPostable {
                account_id: account.id,
                status: account.status,
                operation: format!("{} before maturity", transaction_type.as_str()),
            });
        }
        Ok(())
    }

    fn ensure_above_floor(
        &self,
        account: &SavingsAccount,
        transaction_type: TransactionType,
        allow_overdraft: bool,
        net: Money,
        balance_after: Money,
    ) -> Result<(), LedgerError> {
        let floor = if transaction_type.is_debit() {
            account.debit_floor(self.config.enforce_minimum_balance, allow_overdraft)
        } else {
            Money::ZERO
        };
        if balance_after < floor {
            return Err(LedgerError::InsufficientFunds {
                account_id: account.id,
                balance: account.balance,
                requested: net.abs(),
                floor,
            });
        }
        Ok(())
    }

    /// Approves or fails a pending posting
    ///
    /// Completing re-reads the account under its lock and recomputes the
    /// before/after balances against the balance at that moment, so the
    /// figures recorded at request time never leak into the history.
    #[instrument(skip(self))]
    pub async fn set_transaction_status(
        &self,
        transaction_id: TransactionId,
        status: TransactionStatus,
    ) -> Result<SavingsTransaction, LedgerError> {
        if !matches!(status, TransactionStatus::Completed | TransactionStatus::Failed) {
            return Err(LedgerError::validation(
                "pending transactions can only be completed or failed",
            ));
        }

        let account_id = self
            .repository
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::transaction_not_found(transaction_id))?
            .account_id;

        let mut uow = self.begin(&[account_id]).await?;
        let mut transaction = uow
            .transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::transaction_not_found(transaction_id))?;

        if transaction.status != TransactionStatus::Pending {
            return Err(LedgerError::InvalidStateTransition(format!(
                "transaction {} is {:?}, not pending",
                transaction_id, transaction.status
            )));
        }

        let now = self.clock.now();
        if status == TransactionStatus::Completed {
            let mut account = uow.account(account_id).await?;
            self.ensure_postable(&account, transaction.transaction_type, now)?;

            let net = transaction.net_effect();
            let balance_after = account.balance.checked_add(&net)?;
            self.ensure_above_floor(
                &account,
                transaction.transaction_type,
                transaction.overdraft_authorized,
                net,
                balance_after,
            )?;

            transaction.balance_before = account.balance;
            transaction.balance_after = balance_after;
            transaction.completed_at = Some(now);
            account.balance = balance_after;
            account.updated_at = now;
            uow.update_account(&account).await?;
        }

        transaction.status = status;
        uow.update_transaction(&transaction).await?;
        uow.commit().await?;

        info!(%transaction_id, ?status, "Pending transaction resolved");
        Ok(transaction)
    }

    /// Moves money between two accounts as one atomic unit
    ///
    /// Both legs settle immediately and share the reference. Locks are taken
    /// in ascending account order regardless of direction.
    #[instrument(skip(self, request), fields(from = %request.from_account, to = %request.to_account, amount = %request.amount))]
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, LedgerError> {
        if request.from_account == request.to_account {
            return Err(LedgerError::validation("cannot transfer to the same account"));
        }

        let mut uow = self
            .begin(&[request.from_account, request.to_account])
            .await?;
        let now = self.clock.now();

        let mut outgoing = PostRequest::new(request.from_account, TransactionType::TransferOut, request.amount)
            .with_fees(request.fees_charged)
            .with_payment_method(PaymentMethod::Internal)
            .pre_approved();
        let mut incoming = PostRequest::new(request.to_account, TransactionType::TransferIn, request.amount)
            .with_payment_method(PaymentMethod::Internal)
            .pre_approved();
        if let Some(reference) = request.reference_number.clone() {
            outgoing = outgoing.with_reference(reference.clone());
            incoming = incoming.with_reference(reference);
        }
        if let Some(description) = request.description.clone() {
            outgoing = outgoing.with_description(description.clone());
            incoming = incoming.with_description(description);
        }

        let outgoing = self.post_within(uow.as_mut(), &outgoing, now).await?;
        let incoming = self.post_within(uow.as_mut(), &incoming, now).await?;
        uow.commit().await?;

        Ok(TransferReceipt { outgoing, incoming })
    }

    /// Reverses a completed posting with a counter-posting
    ///
    /// The counter-posting carries the absolute net effect of the original
    /// (fees included, no new fees), references `REV-<original id>` and
    /// points back at the original, which becomes `Reversed`.
    ///
    /// # Errors
    ///
    /// - `NotReversible` when the original is not completed, is itself a
    ///   reversal, was already reversed or has a non-reversible type
    /// - `AccountNotPostable` on a closed account
    /// - `InsufficientFunds` when undoing a credit would go below zero
    #[instrument(skip(self, reason))]
    pub async fn reverse(
        &self,
        transaction_id: TransactionId,
        reason: Option<String>,
    ) -> Result<SavingsTransaction, LedgerError> {
        let account_id = self
            .repository
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::transaction_not_found(transaction_id))?
            .account_id;

        let mut uow = self.begin(&[account_id]).await?;
        let mut original = uow
            .transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::transaction_not_found(transaction_id))?;

        let not_reversible = |reason: &str| LedgerError::NotReversible {
            transaction_id,
            reason: reason.to_string(),
        };

        if original.is_reversal() {
            return Err(not_reversible("transaction is itself a reversal"));
        }
        if original.status != TransactionStatus::Completed {
            return Err(not_reversible(&format!("status is {:?}", original.status)));
        }
        if uow.find_reversal(transaction_id).await?.is_some() {
            return Err(not_reversible("already reversed"));
        }
        let counter_type = original
            .transaction_type
            .reversal_counterpart()
            .ok_or_else(|| not_reversible(&format!("{} cannot be reversed", original.transaction_type.as_str())))?;

        let net = original.net_effect();
        if net.is_zero() || net.is_positive() != original.transaction_type.is_credit() {
            return Err(not_reversible("fees cancel or exceed the amount"));
        }

        let mut account = uow.account(account_id).await?;
        if account.status == AccountStatus::Closed {
            return Err(LedgerError::AccountNotPostable {
                account_id,
                status: account.status,
                operation: "reversal".to_string(),
            });
        }

        let balance_after = account.balance.checked_sub(&net)?;
        if balance_after.is_negative() {
            return Err(LedgerError::InsufficientFunds {
                account_id,
                balance: account.balance,
                requested: net.abs(),
                floor: Money::ZERO,
            });
        }

        let now = self.clock.now();
        let description = match reason {
            Some(reason) => format!("Reversal of {}: {}", transaction_id, reason),
            None => format!("Reversal of {}", transaction_id),
        };
        let counter = SavingsTransaction {
            id: TransactionId::new_v7(),
            account_id,
            member_id: original.member_id,
            transaction_type: counter_type,
            amount: net.abs(),
            balance_before: account.balance,
            balance_after,
            payment_method: PaymentMethod::Internal,
            reference_number: Some(format!("REV-{}", transaction_id.as_uuid())),
            description: Some(description),
            status: TransactionStatus::Completed,
            fees_charged: Money::ZERO,
            requires_approval: false,
            overdraft_authorized: false,
            reversal_of: Some(transaction_id),
            created_at: now,
            completed_at: Some(now),
        };

        original.status = TransactionStatus::Reversed;
        account.balance = balance_after;
        account.updated_at = now;

        uow.update_transaction(&original).await?;
        uow.insert_transaction(&counter).await?;
        uow.update_account(&account).await?;
        uow.commit().await?;

        info!(
            original_id = %transaction_id,
            reversal_id = %counter.id,
            balance_after = %counter.balance_after,
            "Transaction reversed"
        );
        Ok(counter)
    }

    /// Credits one period of interest on the current balance
    ///
    /// Interest is `balance * annual rate / periods per year`, rounded half-up
    /// to cents. A period already credited returns its existing posting;
    /// `None` is returned when there is nothing to credit.
    #[instrument(skip(self))]
    pub async fn post_interest(
        &self,
        account_id: SavingsAccountId,
        period_label: &str,
    ) -> Result<Option<SavingsTransaction>, LedgerError> {
        let label = period_label.trim();
        if label.is_empty() {
            return Err(LedgerError::validation("period label is required"));
        }

        let reference = format!("INTEREST-{}", label);
        let mut uow = self.begin(&[account_id]).await?;
        if let Some(existing) = uow
            .find_by_reference(account_id, &reference, TransactionType::Interest)
            .await?
        {
            return Ok(Some(existing));
        }
        let account = uow.account(account_id).await?;

        let periods = Decimal::from(account.interest_period.periods_per_year());
        let interest = account
            .balance
            .checked_mul(account.interest_rate.as_decimal())?
            .divide(periods)?
            .round_to_cents();
        if !interest.is_positive() {
            return Ok(None);
        }

        let request = PostRequest::new(account_id, TransactionType::Interest, interest)
            .with_reference(reference)
            .with_description(format!("Interest for {}", label))
            .with_payment_method(PaymentMethod::Internal)
            .pre_approved();
        let now = self.clock.now();
        let transaction = self.post_within(uow.as_mut(), &request, now).await?;
        uow.commit().await?;
        Ok(Some(transaction))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_account(&self, account_id: SavingsAccountId) -> Result<SavingsAccount, LedgerError> {
        self.repository
            .find_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    pub async fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<SavingsTransaction, LedgerError> {
        self.repository
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::transaction_not_found(transaction_id))
    }

    /// Account history, oldest first
    pub async fn list_transactions(
        &self,
        account_id: SavingsAccountId,
    ) -> Result<Vec<SavingsTransaction>, LedgerError> {
        self.get_account(account_id).await?;
        self.repository.list_transactions(account_id).await
    }

    /// Completed movements in `[from, to)` with the balances around them
    pub async fn account_statement(
        &self,
        account_id: SavingsAccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<AccountStatement, LedgerError> {
        if from > to {
            return Err(LedgerError::validation("statement start is after its end"));
        }

        let history = self.list_transactions(account_id).await?;
        let settled = history.into_iter().filter(|tx| {
            matches!(tx.status, TransactionStatus::Completed | TransactionStatus::Reversed)
        });

        let mut opening_balance = Money::ZERO;
        let mut total_credits = Money::ZERO;
        let mut total_debits = Money::ZERO;
        let mut transactions = Vec::new();

        for tx in settled {
            let at = tx.completed_at.unwrap_or(tx.created_at);
            if at < from {
                opening_balance = opening_balance.checked_add(&tx.net_effect())?;
            } else if at < to {
                let net = tx.net_effect();
                if net.is_positive() {
                    total_credits = total_credits.checked_add(&net)?;
                } else {
                    total_debits = total_debits.checked_add(&net.abs())?;
                }
                transactions.push(tx);
            }
        }
        let closing_balance = opening_balance.checked_add(&total_credits.checked_sub(&total_debits)?)?;

        Ok(AccountStatement {
            account_id,
            from,
            to,
            opening_balance,
            closing_balance,
            total_credits,
            total_debits,
            transactions,
        })
    }
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
