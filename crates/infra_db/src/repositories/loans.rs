//! Loan book persistence
//!
//! Row types and queries for `loans`, `loan_guarantors`, `loan_repayments` and
//! the `guarantor_locks` table used to serialize exposure checks per member.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use core_kernel::{
    GuarantorId, LoanId, MemberId, Money, RepaymentId, SavingsAccountId, TransactionId,
};
use domain_loan::{
    GuaranteeCommitment, GuaranteeTerms, GuarantorStatus, GuarantorType, Loan, LoanGuarantor,
    LoanRepayment, LoanStatus,
};

use crate::error::DatabaseError;

/// Unique constraint guarding the repayment reference per loan
pub const REPAYMENT_REFERENCE_CONSTRAINT: &str = "loan_repayments_reference_key";

const LOAN_COLUMNS: &str = r#"
    loan_id, member_id, principal, purpose, term_months, interest_rate, monthly_payment,
    total_interest, total_repaid, repayment_count, disbursement_account_id, status,
    application_date, approval_date, disbursement_date, next_payment_date, closed_date,
    disbursement_transaction_id, status_reason, created_at, updated_at
"#;

const GUARANTOR_COLUMNS: &str = r#"
    guarantor_id, loan_id, guarantor_member_id, guarantee_amount, guarantee_percentage,
    guarantor_type, status, created_at, updated_at
"#;

/// Database row for `loans`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoanRow {
    pub loan_id: Uuid,
    pub member_id: Uuid,
    pub principal: Decimal,
    pub purpose: String,
    pub term_months: i32,
    pub interest_rate: Decimal,
    pub monthly_payment: Decimal,
    pub total_interest: Decimal,
    pub total_repaid: Decimal,
    pub repayment_count: i32,
    pub disbursement_account_id: Uuid,
    pub status: String,
    pub application_date: NaiveDate,
    pub approval_date: Option<NaiveDate>,
    pub disbursement_date: Option<NaiveDate>,
    pub next_payment_date: Option<NaiveDate>,
    pub closed_date: Option<NaiveDate>,
    pub disbursement_transaction_id: Option<Uuid>,
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn parse_loan_status(value: &str) -> Result<LoanStatus, DatabaseError> {
    LoanStatus::parse(value).ok_or_else(|| DatabaseError::corrupt("loan status", value))
}

fn to_u32(column: &str, value: i32) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| DatabaseError::corrupt(column, value))
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl TryFrom<LoanRow> for Loan {
    type Error = DatabaseError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        Ok(Loan {
            id: LoanId::from_uuid(row.loan_id),
            member_id: MemberId::from_uuid(row.member_id),
            principal: Money::new(row.principal),
            purpose: row.purpose,
            term_months: to_u32("term_months", row.term_months)?,
            annual_rate_percent: row.interest_rate,
            monthly_payment: Money::new(row.monthly_payment),
            total_interest: Money::new(row.total_interest),
            total_repaid: Money::new(row.total_repaid),
            repayment_count: to_u32("repayment_count", row.repayment_count)?,
            disbursement_account: SavingsAccountId::from_uuid(row.disbursement_account_id),
            status: parse_loan_status(&row.status)?,
            application_date: row.application_date,
            approval_date: row.approval_date,
            disbursement_date: row.disbursement_date,
            next_payment_date: row.next_payment_date,
            closed_date: row.closed_date,
            disbursement_transaction_id: row.disbursement_transaction_id.map(TransactionId::from_uuid),
            status_reason: row.status_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for `loan_guarantors`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GuarantorRow {
    pub guarantor_id: Uuid,
    pub loan_id: Uuid,
    pub guarantor_member_id: Uuid,
    pub guarantee_amount: Option<Decimal>,
    pub guarantee_percentage: Option<Decimal>,
    pub guarantor_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn terms_from_columns(
    amount: Option<Decimal>,
    percentage: Option<Decimal>,
) -> Result<GuaranteeTerms, DatabaseError> {
    GuaranteeTerms::from_parts(amount.map(Money::new), percentage)
        .map_err(|e| DatabaseError::CorruptRow(e.to_string()))
}

impl TryFrom<GuarantorRow> for LoanGuarantor {
    type Error = DatabaseError;

    fn try_from(row: GuarantorRow) -> Result<Self, Self::Error> {
        Ok(LoanGuarantor {
            id: GuarantorId::from_uuid(row.guarantor_id),
            loan_id: LoanId::from_uuid(row.loan_id),
            guarantor_member_id: MemberId::from_uuid(row.guarantor_member_id),
            terms: terms_from_columns(row.guarantee_amount, row.guarantee_percentage)?,
            guarantor_type: GuarantorType::parse(&row.guarantor_type)
                .ok_or_else(|| DatabaseError::corrupt("guarantor_type", &row.guarantor_type))?,
            status: GuarantorStatus::parse(&row.status)
                .ok_or_else(|| DatabaseError::corrupt("guarantor status", &row.status))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A guarantee joined with the guaranteed loan
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommitmentRow {
    pub guarantor_id: Uuid,
    pub loan_id: Uuid,
    pub loan_status: String,
    pub guarantor_status: String,
    pub guarantee_amount: Option<Decimal>,
    pub guarantee_percentage: Option<Decimal>,
    pub principal: Decimal,
}

impl TryFrom<CommitmentRow> for GuaranteeCommitment {
    type Error = DatabaseError;

    fn try_from(row: CommitmentRow) -> Result<Self, Self::Error> {
        let terms = terms_from_columns(row.guarantee_amount, row.guarantee_percentage)?;
        Ok(GuaranteeCommitment {
            guarantor_id: GuarantorId::from_uuid(row.guarantor_id),
            loan_id: LoanId::from_uuid(row.loan_id),
            loan_status: parse_loan_status(&row.loan_status)?,
            guarantor_status: GuarantorStatus::parse(&row.guarantor_status)
                .ok_or_else(|| DatabaseError::corrupt("guarantor status", &row.guarantor_status))?,
            amount: terms.resolve(Money::new(row.principal)),
        })
    }
}

/// Database row for `loan_repayments`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepaymentRow {
    pub repayment_id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub reference: String,
    pub source_account: Option<Uuid>,
    pub transaction_id: Option<Uuid>,
    pub paid_at: DateTime<Utc>,
}

impl From<RepaymentRow> for LoanRepayment {
    fn from(row: RepaymentRow) -> Self {
        LoanRepayment {
            id: RepaymentId::from_uuid(row.repayment_id),
            loan_id: LoanId::from_uuid(row.loan_id),
            amount: Money::new(row.amount),
            reference: row.reference,
            source_account: row.source_account.map(SavingsAccountId::from_uuid),
            transaction_id: row.transaction_id.map(TransactionId::from_uuid),
            paid_at: row.paid_at,
        }
    }
}

// ----------------------------------------------------------------------
// Locks
// ----------------------------------------------------------------------

/// Takes `FOR UPDATE` locks on existing loans in ascending id order
pub async fn lock_loans(conn: &mut PgConnection, ids: &[Uuid]) -> Result<(), DatabaseError> {
    if ids.is_empty() {
        return Ok(());
    }
    sqlx::query("SELECT loan_id FROM loans WHERE loan_id = ANY($1) ORDER BY loan_id FOR UPDATE")
        .bind(ids)
        .fetch_all(conn)
        .await?;
    Ok(())
}

/// Locks one `guarantor_locks` row per member, creating missing rows first
///
/// `ids` must be sorted so concurrent callers insert and lock in the same
/// order.
pub async fn lock_guarantors(conn: &mut PgConnection, ids: &[Uuid]) -> Result<(), DatabaseError> {
    if ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "INSERT INTO guarantor_locks (member_id) SELECT * FROM unnest($1::uuid[]) ON CONFLICT DO NOTHING",
    )
    .bind(ids)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "SELECT member_id FROM guarantor_locks WHERE member_id = ANY($1) ORDER BY member_id FOR UPDATE",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;
    Ok(())
}

// ----------------------------------------------------------------------
// Loans
// ----------------------------------------------------------------------

pub async fn fetch_loan<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<Loan>, DatabaseError> {
    let sql = format!("SELECT {LOAN_COLUMNS} FROM loans WHERE loan_id = $1");
    sqlx::query_as::<_, LoanRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(Loan::try_from)
        .transpose()
}

pub async fn insert_loan(conn: &mut PgConnection, loan: &Loan) -> Result<(), DatabaseError> {
    let sql = format!(
        "INSERT INTO loans ({LOAN_COLUMNS}) VALUES \
         ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
    );
    sqlx::query(&sql)
        .bind(Uuid::from(loan.id))
        .bind(Uuid::from(loan.member_id))
        .bind(loan.principal.amount())
        .bind(&loan.purpose)
        .bind(to_i32(loan.term_months))
        .bind(loan.annual_rate_percent)
        .bind(loan.monthly_payment.amount())
        .bind(loan.total_interest.amount())
        .bind(loan.total_repaid.amount())
        .bind(to_i32(loan.repayment_count))
        .bind(Uuid::from(loan.disbursement_account))
        .bind(loan.status.as_str())
        .bind(loan.application_date)
        .bind(loan.approval_date)
        .bind(loan.disbursement_date)
        .bind(loan.next_payment_date)
        .bind(loan.closed_date)
        .bind(loan.disbursement_transaction_id.map(Uuid::from))
        .bind(&loan.status_reason)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_loan(conn: &mut PgConnection, loan: &Loan) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE loans
        SET monthly_payment = $2, total_interest = $3, total_repaid = $4, repayment_count = $5,
            status = $6, approval_date = $7, disbursement_date = $8, next_payment_date = $9,
            closed_date = $10, disbursement_transaction_id = $11, status_reason = $12,
            updated_at = $13
        WHERE loan_id = $1
        "#,
    )
    .bind(Uuid::from(loan.id))
    .bind(loan.monthly_payment.amount())
    .bind(loan.total_interest.amount())
    .bind(loan.total_repaid.amount())
    .bind(to_i32(loan.repayment_count))
    .bind(loan.status.as_str())
    .bind(loan.approval_date)
    .bind(loan.disbursement_date)
    .bind(loan.next_payment_date)
    .bind(loan.closed_date)
    .bind(loan.disbursement_transaction_id.map(Uuid::from))
    .bind(&loan.status_reason)
    .bind(loan.updated_at)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("Loan", loan.id));
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Guarantors
// ----------------------------------------------------------------------

pub async fn guarantors_for_loan<'e, E: PgExecutor<'e>>(
    executor: E,
    loan_id: Uuid,
) -> Result<Vec<LoanGuarantor>, DatabaseError> {
    let sql = format!(
        "SELECT {GUARANTOR_COLUMNS} FROM loan_guarantors WHERE loan_id = $1 ORDER BY created_at, guarantor_id"
    );
    sqlx::query_as::<_, GuarantorRow>(&sql)
        .bind(loan_id)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(LoanGuarantor::try_from)
        .collect()
}

pub async fn commitments_for_member<'e, E: PgExecutor<'e>>(
    executor: E,
    member_id: Uuid,
) -> Result<Vec<GuaranteeCommitment>, DatabaseError> {
    sqlx::query_as::<_, CommitmentRow>(
        r#"
        SELECT g.guarantor_id, g.loan_id, l.status AS loan_status, g.status AS guarantor_status,
               g.guarantee_amount, g.guarantee_percentage, l.principal
        FROM loan_guarantors g
        JOIN loans l ON l.loan_id = g.loan_id
        WHERE g.guarantor_member_id = $1
        ORDER BY g.created_at, g.guarantor_id
        "#,
    )
    .bind(member_id)
    .fetch_all(executor)
    .await?
    .into_iter()
    .map(GuaranteeCommitment::try_from)
    .collect()
}

pub async fn insert_guarantor(conn: &mut PgConnection, guarantor: &LoanGuarantor) -> Result<(), DatabaseError> {
    let sql = format!(
        "INSERT INTO loan_guarantors ({GUARANTOR_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    );
    sqlx::query(&sql)
        .bind(Uuid::from(guarantor.id))
        .bind(Uuid::from(guarantor.loan_id))
        .bind(Uuid::from(guarantor.guarantor_member_id))
        .bind(guarantor.terms.amount().map(|m| m.amount()))
        .bind(guarantor.terms.percentage())
        .bind(guarantor.guarantor_type.as_str())
        .bind(guarantor.status.as_str())
        .bind(guarantor.created_at)
        .bind(guarantor.updated_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn update_guarantor(conn: &mut PgConnection, guarantor: &LoanGuarantor) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        "UPDATE loan_guarantors SET status = $2, updated_at = $3 WHERE guarantor_id = $1",
    )
    .bind(Uuid::from(guarantor.id))
    .bind(guarantor.status.as_str())
    .bind(guarantor.updated_at)
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found("LoanGuarantor", guarantor.id));
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Repayments
// ----------------------------------------------------------------------

pub async fn repayments_for_loan<'e, E: PgExecutor<'e>>(
    executor: E,
    loan_id: Uuid,
) -> Result<Vec<LoanRepayment>, DatabaseError> {
    let rows = sqlx::query_as::<_, RepaymentRow>(
        r#"
        SELECT repayment_id, loan_id, amount, reference, source_account, transaction_id, paid_at
        FROM loan_repayments
        WHERE loan_id = $1
        ORDER BY paid_at, repayment_id
        "#,
    )
    .bind(loan_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(LoanRepayment::from).collect())
}

pub async fn find_repayment(
    conn: &mut PgConnection,
    loan_id: Uuid,
    reference: &str,
) -> Result<Option<LoanRepayment>, DatabaseError> {
    let row = sqlx::query_as::<_, RepaymentRow>(
        r#"
        SELECT repayment_id, loan_id, amount, reference, source_account, transaction_id, paid_at
        FROM loan_repayments
        WHERE loan_id = $1 AND reference = $2
        "#,
    )
    .bind(loan_id)
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(LoanRepayment::from))
}

pub async fn insert_repayment(conn: &mut PgConnection, repayment: &LoanRepayment) -> Result<(), DatabaseError> {
    sqlx::query(
        r#"
        INSERT INTO loan_repayments
            (repayment_id, loan_id, amount, reference, source_account, transaction_id, paid_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::from(repayment.id))
    .bind(Uuid::from(repayment.loan_id))
    .bind(repayment.amount.amount())
    .bind(&repayment.reference)
    .bind(repayment.source_account.map(Uuid::from))
    .bind(repayment.transaction_id.map(Uuid::from))
    .bind(repayment.paid_at)
    .execute(conn)
    .await?;
    Ok(())
}
