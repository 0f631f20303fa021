//! PostgreSQL Loan Adapter
//!
//! Implements [`LoanRepository`] over `loans`, `loan_guarantors` and
//! `loan_repayments`. Guarantor members are serialized through one row each
//! in `guarantor_locks`, created on first use, so two units of work checking
//! the same member's exposure never overlap.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, LoanId, MemberId};
use domain_loan::{
    GuaranteeCommitment, Loan, LoanError, LoanGuarantor, LoanRepayment, LoanRepository,
    LoanUnitOfWork, LockScope,
};

use crate::error::DatabaseError;
use crate::repositories;
use crate::repositories::loans::{self as sql, REPAYMENT_REFERENCE_CONSTRAINT};

/// PostgreSQL-backed implementation of [`LoanRepository`]
#[derive(Debug, Clone)]
pub struct PostgresLoanRepository {
    pool: PgPool,
}

impl PostgresLoanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DomainPort for PostgresLoanRepository {}

#[async_trait]
impl HealthCheckable for PostgresLoanRepository {
    async fn health_check(&self) -> HealthCheckResult {
        super::ping(&self.pool, "postgres-loans").await
    }
}

fn loan_error(error: DatabaseError, waited_ms: u64) -> LoanError {
    match error {
        DatabaseError::LockTimeout(resource) => LoanError::LockTimeout { resource, waited_ms },
        other => other.into(),
    }
}

fn sorted<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    let mut out: Vec<Uuid> = ids.iter().copied().map(Into::into).collect();
    out.sort();
    out.dedup();
    out
}

#[async_trait]
impl LoanRepository for PostgresLoanRepository {
    #[instrument(skip(self, scope), fields(loans = scope.loans.len(), guarantors = scope.guarantors.len()))]
    async fn begin(
        &self,
        scope: &LockScope,
        timeout: Duration,
    ) -> Result<Box<dyn LoanUnitOfWork>, LoanError> {
        let waited_ms = timeout.as_millis() as u64;
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;

        repositories::set_lock_timeout(&mut tx, waited_ms)
            .await
            .map_err(|e| loan_error(e, waited_ms))?;
        sql::lock_loans(&mut tx, &sorted(&scope.loans))
            .await
            .map_err(|e| loan_error(e, waited_ms))?;
        sql::lock_guarantors(&mut tx, &sorted(&scope.guarantors))
            .await
            .map_err(|e| loan_error(e, waited_ms))?;
        debug!("Loan scope locked");

        Ok(Box::new(PgLoanUnitOfWork {
            tx,
            locked_loans: scope.loans.iter().copied().collect(),
            locked_members: scope.guarantors.iter().copied().collect(),
            waited_ms,
        }))
    }

    async fn find_loan(&self, id: LoanId) -> Result<Option<Loan>, LoanError> {
        Ok(sql::fetch_loan(&self.pool, id.into()).await?)
    }

    async fn guarantors_for_loan(&self, loan_id: LoanId) -> Result<Vec<LoanGuarantor>, LoanError> {
        Ok(sql::guarantors_for_loan(&self.pool, loan_id.into()).await?)
    }

    async fn commitments_for_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<GuaranteeCommitment>, LoanError> {
        Ok(sql::commitments_for_member(&self.pool, member_id.into()).await?)
    }

    async fn repayments_for_loan(&self, loan_id: LoanId) -> Result<Vec<LoanRepayment>, LoanError> {
        Ok(sql::repayments_for_loan(&self.pool, loan_id.into()).await?)
    }
}

struct PgLoanUnitOfWork {
    tx: Transaction<'static, Postgres>,
    locked_loans: HashSet<LoanId>,
    locked_members: HashSet<MemberId>,
    waited_ms: u64,
}

impl PgLoanUnitOfWork {
    fn ensure_loan_locked(&self, id: LoanId) -> Result<(), LoanError> {
        if self.locked_loans.contains(&id) {
            Ok(())
        } else {
            Err(LoanError::Storage(format!("{id} is not locked by this unit of work")))
        }
    }

    fn ensure_member_locked(&self, id: MemberId) -> Result<(), LoanError> {
        if self.locked_members.contains(&id) {
            Ok(())
        } else {
            Err(LoanError::Storage(format!(
                "guarantor {id} is not locked by this unit of work"
            )))
        }
    }

    fn map(&self, error: DatabaseError) -> LoanError {
        loan_error(error, self.waited_ms)
    }
}

#[async_trait]
impl LoanUnitOfWork for PgLoanUnitOfWork {
    async fn loan(&mut self, id: LoanId) -> Result<Loan, LoanError> {
        self.ensure_loan_locked(id)?;
        sql::fetch_loan(&mut *self.tx, id.into())
            .await
            .map_err(|e| self.map(e))?
            .ok_or_else(|| LoanError::loan_not_found(id))
    }

    async fn insert_loan(&mut self, loan: &Loan) -> Result<(), LoanError> {
        self.ensure_loan_locked(loan.id)?;
        match sql::insert_loan(&mut self.tx, loan).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::DuplicateEntry(_)) => {
                Err(LoanError::validation(format!("loan {} already exists", loan.id)))
            }
            Err(e) => Err(self.map(e)),
        }
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<(), LoanError> {
        self.ensure_loan_locked(loan.id)?;
        match sql::update_loan(&mut self.tx, loan).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::NotFound(_)) => Err(LoanError::loan_not_found(loan.id)),
            Err(e) => Err(self.map(e)),
        }
    }

    async fn guarantors(&mut self, loan_id: LoanId) -> Result<Vec<LoanGuarantor>, LoanError> {
        self.ensure_loan_locked(loan_id)?;
        sql::guarantors_for_loan(&mut *self.tx, loan_id.into())
            .await
            .map_err(|e| self.map(e))
    }

    async fn insert_guarantor(&mut self, guarantor: &LoanGuarantor) -> Result<(), LoanError> {
        self.ensure_loan_locked(guarantor.loan_id)?;
        self.ensure_member_locked(guarantor.guarantor_member_id)?;
        sql::insert_guarantor(&mut self.tx, guarantor)
            .await
            .map_err(|e| self.map(e))
    }

    async fn update_guarantor(&mut self, guarantor: &LoanGuarantor) -> Result<(), LoanError> {
        self.ensure_loan_locked(guarantor.loan_id)?;
        match sql::update_guarantor(&mut self.tx, guarantor).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::NotFound(_)) => Err(LoanError::NotFound {
                entity: "Guarantor",
                id: guarantor.id.to_string(),
            }),
            Err(e) => Err(self.map(e)),
        }
    }

    async fn commitments(&mut self, member_id: MemberId) -> Result<Vec<GuaranteeCommitment>, LoanError> {
        self.ensure_member_locked(member_id)?;
        sql::commitments_for_member(&mut *self.tx, member_id.into())
            .await
            .map_err(|e| self.map(e))
    }

    async fn find_repayment(
        &mut self,
        loan_id: LoanId,
        reference: &str,
    ) -> Result<Option<LoanRepayment>, LoanError> {
        sql::find_repayment(&mut self.tx, loan_id.into(), reference)
            .await
            .map_err(|e| self.map(e))
    }

    async fn insert_repayment(&mut self, repayment: &LoanRepayment) -> Result<(), LoanError> {
        self.ensure_loan_locked(repayment.loan_id)?;
        match sql::insert_repayment(&mut self.tx, repayment).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::DuplicateEntry(constraint))
                if constraint == REPAYMENT_REFERENCE_CONSTRAINT =>
            {
                Err(LoanError::DuplicateRepayment {
                    loan_id: repayment.loan_id,
                    reference: repayment.reference.clone(),
                })
            }
            Err(e) => Err(self.map(e)),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), LoanError> {
        let this = *self;
        let waited_ms = this.waited_ms;
        this.tx
            .commit()
            .await
            .map_err(|e| loan_error(DatabaseError::from(e), waited_ms))
    }
}
