//! Savings account and posting persistence
//!
//! Row types and queries for `savings_accounts` and `savings_transactions`.
//! Every function takes an executor so the same SQL serves pooled reads and
//! statements inside a locked unit of work.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use core_kernel::{MemberId, Money, Rate, SavingsAccountId, TransactionId};
use domain_savings::{
    AccountStatus, AccountType, InterestPeriod, PaymentMethod, SavingsAccount, SavingsTransaction,
    TransactionStatus, TransactionType,
};

use crate::error::DatabaseError;

/// Unique constraint guarding the posting idempotency key
pub const REFERENCE_CONSTRAINT: &str = "savings_transactions_reference_key";

const ACCOUNT_COLUMNS: &str = r#"
    account_id, member_id, account_number, account_type, balance, minimum_balance,
    interest_rate, interest_period, maturity_date, target_amount, status, created_by,
    opened_at, updated_at, closed_at
"#;

const TRANSACTION_COLUMNS: &str = r#"
    transaction_id, account_id, member_id, transaction_type, amount, balance_before,
    balance_after, payment_method, reference_number, description, transaction_status,
    fees_charged, requires_approval, overdraft_authorized, reversal_of, created_at,
    completed_at
"#;

/// Database row for `savings_accounts`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub account_id: Uuid,
    pub member_id: Uuid,
    pub account_number: String,
    pub account_type: String,
    pub balance: Decimal,
    pub minimum_balance: Decimal,
    pub interest_rate: Decimal,
    pub interest_period: String,
    pub maturity_date: Option<NaiveDate>,
    pub target_amount: Option<Decimal>,
    pub status: String,
    pub created_by: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TryFrom<AccountRow> for SavingsAccount {
    type Error = DatabaseError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(SavingsAccount {
            id: SavingsAccountId::from_uuid(row.account_id),
            member_id: MemberId::from_uuid(row.member_id),
            account_number: row.account_number,
            account_type: AccountType::parse(&row.account_type)
                .ok_or_else(|| DatabaseError::corrupt("account_type", &row.account_type))?,
            balance: Money::new(row.balance),
            minimum_balance: Money::new(row.minimum_balance),
            interest_rate: Rate::new(row.interest_rate),
            interest_period: InterestPeriod::parse(&row.interest_period)
                .ok_or_else(|| DatabaseError::corrupt("interest_period", &row.interest_period))?,
            maturity_date: row.maturity_date,
            target_amount: row.target_amount.map(Money::new),
            status: AccountStatus::parse(&row.status)
                .ok_or_else(|| DatabaseError::corrupt("status", &row.status))?,
            created_by: row.created_by,
            opened_at: row.opened_at,
            updated_at: row.updated_at,
            closed_at: row.closed_at,
        })
    }
}

/// Database row for `savings_transactions`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub member_id: Uuid,
    pub transaction_type: String,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub description: Option<String>,
    pub transaction_status: String,
    pub fees_charged: Decimal,
    pub requires_approval: bool,
    pub overdraft_authorized: bool,
    pub reversal_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for SavingsTransaction {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(SavingsTransaction {
            id: TransactionId::from_uuid(row.transaction_id),
            account_id: SavingsAccountId::from_uuid(row.account_id),
            member_id: MemberId::from_uuid(row.member_id),
            transaction_type: TransactionType::parse(&row.transaction_type)
                .ok_or_else(|| DatabaseError::corrupt("transaction_type", &row.transaction_type))?,
            amount: Money::new(row.amount),
            balance_before: Money::new(row.balance_before),
            balance_after: Money::new(row.balance_after),
            payment_method: PaymentMethod::parse(&row.payment_method)
                .ok_or_else(|| DatabaseError::corrupt("payment_method", &row.payment_method))?,
            reference_number: row.reference_number,
            description: row.description,
            status: TransactionStatus::parse(&row.transaction_status).ok_or_else(|| {
                DatabaseError::corrupt("transaction_status", &row.transaction_status)
            })?,
            fees_charged: Money::new(row.fees_charged),
            requires_approval: row.requires_approval,
            overdraft_authorized: row.overdraft_authorized,
            reversal_of: row.reversal_of.map(TransactionId::from_uuid),
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

/// Takes `FOR UPDATE` locks on existing accounts in ascending id order
pub async fn lock_accounts(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Uuid>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let locked = sqlx::query_scalar::<_, Uuid>(
        "SELECT account_id FROM savings_accounts WHERE account_id = ANY($1) ORDER BY account_id FOR UPDATE",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;
    Ok(locked)
}

pub async fn fetch_account<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<SavingsAccount>, DatabaseError> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM savings_accounts WHERE account_id = $1");
    sqlx::query_as::<_, AccountRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(SavingsAccount::try_from)
        .transpose()
}

pub async fn account_number_exists<'e, E: PgExecutor<'e>>(
    executor: E,
    account_number: &str,
) -> Result<bool, DatabaseError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM savings_accounts WHERE account_number = $1)",
    )
    .bind(account_number)
    .fetch_one(executor)
    .await?;
    Ok(exists)
}

pub async fn insert_account(conn: &mut PgConnection, account: &SavingsAccount) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO savings_accounts (
            account_id, member_id, account_number, account_type, balance, minimum_balance,
            interest_rate, interest_period, maturity_date, target_amount, status, created_by,
            opened_at, updated_at, closed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(Uuid::from(account.id))
    .bind(Uuid::from(account.member_id))
    .bind(&account.account_number)
    .bind(account.account_type.as_str())
    .bind(account.balance.amount())
    .bind(account.minimum_balance.amount())
    .bind(account.interest_rate.as_decimal())
    .bind(account.interest_period.as_str())
    .bind(account.maturity_date)
    .bind(account.target_amount.map(|m| m.amount()))
    .bind(account.status.as_str())
    .bind(&account.created_by)
    .bind(account.opened_at)
    .bind(account.updated_at)
    .bind(account.closed_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Writes the mutable columns of an account
pub async fn update_account(conn: &mut PgConnection, account: &SavingsAccount) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE savings_accounts
        SET balance = $2, minimum_balance = $3, interest_rate = $4, status = $5,
            updated_at = $6, closed_at = $7
        WHERE account_id = $1
        "#,
    )
    .bind(Uuid::from(account.id))
    .bind(account.balance.amount())
    .bind(account.minimum_balance.amount())
    .bind(account.interest_rate.as_decimal())
    .bind(account.status.as_str())
    .bind(account.updated_at)
    .bind(account.closed_at)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("SavingsAccount", account.id));
    }
    Ok(())
}

pub async fn fetch_transaction<'e, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<SavingsTransaction>, DatabaseError> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM savings_transactions WHERE transaction_id = $1");
    sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(SavingsTransaction::try_from)
        .transpose()
}

/// Postings of an account in insertion order
pub async fn list_transactions<'e, E: PgExecutor<'e>>(
    executor: E,
    account_id: Uuid,
) -> Result<Vec<SavingsTransaction>, DatabaseError> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM savings_transactions WHERE account_id = $1 ORDER BY seq"
    );
    sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(account_id)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(SavingsTransaction::try_from)
        .collect()
}

pub async fn find_by_reference(
    conn: &mut PgConnection,
    account_id: Uuid,
    reference: &str,
    transaction_type: TransactionType,
) -> Result<Option<SavingsTransaction>, DatabaseError> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM savings_transactions \
         WHERE account_id = $1 AND reference_number = $2 AND transaction_type = $3"
    );
    sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(account_id)
        .bind(reference)
        .bind(transaction_type.as_str())
        .fetch_optional(conn)
        .await?
        .map(SavingsTransaction::try_from)
        .transpose()
}

pub async fn find_reversal(
    conn: &mut PgConnection,
    original: Uuid,
) -> Result<Option<SavingsTransaction>, DatabaseError> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM savings_transactions WHERE reversal_of = $1");
    sqlx::query_as::<_, TransactionRow>(&sql)
        .bind(original)
        .fetch_optional(conn)
        .await?
        .map(SavingsTransaction::try_from)
        .transpose()
}

pub async fn has_pending(conn: &mut PgConnection, account_id: Uuid) -> Result<bool, DatabaseError> {
    let pending = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM savings_transactions WHERE account_id = $1 AND transaction_status = 'pending')",
    )
    .bind(account_id)
    .fetch_one(conn)
    .await?;
    Ok(pending)
}

pub async fn insert_transaction(
    conn: &mut PgConnection,
    tx: &SavingsTransaction,
) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO savings_transactions (
            transaction_id, account_id, member_id, transaction_type, amount, balance_before,
            balance_after, payment_method, reference_number, description, transaction_status,
            fees_charged, requires_approval, overdraft_authorized, reversal_of, created_at,
            completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(Uuid::from(tx.id))
    .bind(Uuid::from(tx.account_id))
    .bind(Uuid::from(tx.member_id))
    .bind(tx.transaction_type.as_str())
    .bind(tx.amount.amount())
    .bind(tx.balance_before.amount())
    .bind(tx.balance_after.amount())
    .bind(tx.payment_method.as_str())
    .bind(&tx.reference_number)
    .bind(&tx.description)
    .bind(tx.status.as_str())
    .bind(tx.fees_charged.amount())
    .bind(tx.requires_approval)
    .bind(tx.overdraft_authorized)
    .bind(tx.reversal_of.map(Uuid::from))
    .bind(tx.created_at)
    .bind(tx.completed_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Writes the columns that change when a pending posting is decided or an
/// original is reversed
pub async fn update_transaction(
    conn: &mut PgConnection,
    tx: &SavingsTransaction,
) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE savings_transactions
        SET balance_before = $2, balance_after = $3, transaction_status = $4, completed_at = $5
        WHERE transaction_id = $1
        "#,
    )
    .bind(Uuid::from(tx.id))
    .bind(tx.balance_before.amount())
    .bind(tx.balance_after.amount())
    .bind(tx.status.as_str())
    .bind(tx.completed_at)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("SavingsTransaction", tx.id));
    }
    Ok(())
}
