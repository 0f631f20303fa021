//! Loan storage port
//!
//! Mirrors the ledger port: mutations run in a [`LoanUnitOfWork`] opened over
//! a [`LockScope`]. Loans are locked first, then guarantor members, each group
//! in ascending id order. A guarantor member's lock serializes every exposure
//! check and guarantee insert for that member across all loans.

use std::time::Duration;

use async_trait::async_trait;

use core_kernel::{DomainPort, HealthCheckable, LoanId, MemberId};

use crate::error::LoanError;
use crate::exposure::GuaranteeCommitment;
use crate::guarantor::LoanGuarantor;
use crate::loan::{Loan, LoanRepayment};

/// Keys a unit of work must hold
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockScope {
    pub loans: Vec<LoanId>,
    pub guarantors: Vec<MemberId>,
}

impl LockScope {
    pub fn loan(loan_id: LoanId) -> Self {
        Self {
            loans: vec![loan_id],
            guarantors: Vec::new(),
        }
    }

    pub fn with_guarantors(mut self, members: impl IntoIterator<Item = MemberId>) -> Self {
        self.guarantors.extend(members);
        self
    }
}

/// Repository for loans, their guarantors and repayments
#[async_trait]
pub trait LoanRepository: DomainPort + HealthCheckable {
    /// Locks the scope and opens a unit of work over it
    ///
    /// # Errors
    ///
    /// `LoanError::LockTimeout` when any lock is not granted within `timeout`.
    async fn begin(
        &self,
        scope: &LockScope,
        timeout: Duration,
    ) -> Result<Box<dyn LoanUnitOfWork>, LoanError>;

    async fn find_loan(&self, id: LoanId) -> Result<Option<Loan>, LoanError>;

    async fn guarantors_for_loan(&self, loan_id: LoanId) -> Result<Vec<LoanGuarantor>, LoanError>;

    /// Every guarantee a member holds, with the guaranteed loan's status
    async fn commitments_for_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<GuaranteeCommitment>, LoanError>;

    /// Repayments of a loan, oldest first
    async fn repayments_for_loan(&self, loan_id: LoanId) -> Result<Vec<LoanRepayment>, LoanError>;
}

/// Atomic batch of loan writes over a locked scope
#[async_trait]
pub trait LoanUnitOfWork: Send {
    /// Reads a locked loan, including writes staged in this unit
    async fn loan(&mut self, id: LoanId) -> Result<Loan, LoanError>;

    async fn insert_loan(&mut self, loan: &Loan) -> Result<(), LoanError>;

    async fn update_loan(&mut self, loan: &Loan) -> Result<(), LoanError>;

    /// Guarantors of a locked loan
    async fn guarantors(&mut self, loan_id: LoanId) -> Result<Vec<LoanGuarantor>, LoanError>;

    /// Requires both the loan and the guarantor member to be locked
    async fn insert_guarantor(&mut self, guarantor: &LoanGuarantor) -> Result<(), LoanError>;

    async fn update_guarantor(&mut self, guarantor: &LoanGuarantor) -> Result<(), LoanError>;

    /// Commitments of a locked guarantor member, as seen by this unit
    async fn commitments(&mut self, member_id: MemberId) -> Result<Vec<GuaranteeCommitment>, LoanError>;

    async fn find_repayment(
        &mut self,
        loan_id: LoanId,
        reference: &str,
    ) -> Result<Option<LoanRepayment>, LoanError>;

    async fn insert_repayment(&mut self, repayment: &LoanRepayment) -> Result<(), LoanError>;

    /// Applies every staged write atomically and releases the locks
    async fn commit(self: Box<Self>) -> Result<(), LoanError>;
}
