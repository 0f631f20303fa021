//! In-memory loan adapter
//!
//! Same shape as the in-memory ledger: per-key locks for loans and guarantor
//! members, writes staged per unit of work and applied under one write guard.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use core_kernel::{
    DomainPort, GuarantorId, HealthCheckResult, HealthCheckable, KeyedLocks, LoanId, LockSet,
    MemberId,
};

use crate::error::LoanError;
use crate::exposure::GuaranteeCommitment;
use crate::guarantor::LoanGuarantor;
use crate::loan::{Loan, LoanRepayment};
use crate::ports::{LockScope, LoanRepository, LoanUnitOfWork};

#[derive(Debug, Default)]
struct LoanState {
    loans: HashMap<LoanId, Loan>,
    guarantors: HashMap<GuarantorId, LoanGuarantor>,
    by_loan: HashMap<LoanId, Vec<GuarantorId>>,
    by_member: HashMap<MemberId, Vec<GuarantorId>>,
    repayments: HashMap<LoanId, Vec<LoanRepayment>>,
}

impl LoanState {
    fn guarantors_of(&self, loan_id: LoanId) -> Vec<LoanGuarantor> {
        self.by_loan
            .get(&loan_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.guarantors.get(id).cloned())
            .collect()
    }
}

/// In-memory implementation of [`LoanRepository`]
#[derive(Debug, Default, Clone)]
pub struct InMemoryLoanRepository {
    state: Arc<RwLock<LoanState>>,
    loan_locks: Arc<KeyedLocks<LoanId>>,
    member_locks: Arc<KeyedLocks<MemberId>>,
}

impl InMemoryLoanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for InMemoryLoanRepository {}

#[async_trait]
impl HealthCheckable for InMemoryLoanRepository {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("memory-loans")
    }
}

fn commitment(guarantor: &LoanGuarantor, loan: &Loan) -> GuaranteeCommitment {
    GuaranteeCommitment {
        guarantor_id: guarantor.id,
        loan_id: guarantor.loan_id,
        loan_status: loan.status,
        guarantor_status: guarantor.status,
        amount: guarantor.terms.resolve(loan.principal),
    }
}

#[async_trait]
impl LoanRepository for InMemoryLoanRepository {
    async fn begin(
        &self,
        scope: &LockScope,
        timeout: Duration,
    ) -> Result<Box<dyn LoanUnitOfWork>, LoanError> {
        let mut locks = self.loan_locks.acquire(&scope.loans, timeout).await?;
        locks.extend(self.member_locks.acquire(&scope.guarantors, timeout).await?);

        Ok(Box::new(MemoryUnitOfWork {
            state: Arc::clone(&self.state),
            locked_loans: scope.loans.iter().copied().collect(),
            locked_members: scope.guarantors.iter().copied().collect(),
            _locks: locks,
            loans: HashMap::new(),
            new_loans: Vec::new(),
            guarantors: HashMap::new(),
            new_guarantors: Vec::new(),
            repayments: Vec::new(),
        }))
    }

    async fn find_loan(&self, id: LoanId) -> Result<Option<Loan>, LoanError> {
        Ok(self.state.read().await.loans.get(&id).cloned())
    }

    async fn guarantors_for_loan(&self, loan_id: LoanId) -> Result<Vec<LoanGuarantor>, LoanError> {
        Ok(self.state.read().await.guarantors_of(loan_id))
    }

    async fn commitments_for_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<GuaranteeCommitment>, LoanError> {
        let state = self.state.read().await;
        Ok(state
            .by_member
            .get(&member_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.guarantors.get(id))
            .filter_map(|g| state.loans.get(&g.loan_id).map(|loan| commitment(g, loan)))
            .collect())
    }

    async fn repayments_for_loan(&self, loan_id: LoanId) -> Result<Vec<LoanRepayment>, LoanError> {
        Ok(self
            .state
            .read()
            .await
            .repayments
            .get(&loan_id)
            .cloned()
            .unwrap_or_default())
    }
}

struct MemoryUnitOfWork {
    state: Arc<RwLock<LoanState>>,
    locked_loans: HashSet<LoanId>,
    locked_members: HashSet<MemberId>,
    _locks: LockSet,
    loans: HashMap<LoanId, Loan>,
    new_loans: Vec<LoanId>,
    guarantors: HashMap<GuarantorId, LoanGuarantor>,
    new_guarantors: Vec<GuarantorId>,
    repayments: Vec<LoanRepayment>,
}

impl MemoryUnitOfWork {
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

    async fn loan_exists(&self, id: LoanId) -> bool {
        self.loans.contains_key(&id) || self.state.read().await.loans.contains_key(&id)
    }

    /// Staged loan if any, otherwise the stored one
    fn view_loan<'a>(&'a self, state: &'a LoanState, id: LoanId) -> Option<&'a Loan> {
        self.loans.get(&id).or_else(|| state.loans.get(&id))
    }
}

#[async_trait]
impl LoanUnitOfWork for MemoryUnitOfWork {
    async fn loan(&mut self, id: LoanId) -> Result<Loan, LoanError> {
        self.ensure_loan_locked(id)?;
        if let Some(loan) = self.loans.get(&id) {
            return Ok(loan.clone());
        }
        self.state
            .read()
            .await
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| LoanError::loan_not_found(id))
    }

    async fn insert_loan(&mut self, loan: &Loan) -> Result<(), LoanError> {
        self.ensure_loan_locked(loan.id)?;
        if self.loan_exists(loan.id).await {
            return Err(LoanError::validation(format!("loan {} already exists", loan.id)));
        }
        self.loans.insert(loan.id, loan.clone());
        self.new_loans.push(loan.id);
        Ok(())
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<(), LoanError> {
        self.ensure_loan_locked(loan.id)?;
        if !self.loan_exists(loan.id).await {
            return Err(LoanError::loan_not_found(loan.id));
        }
        self.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn guarantors(&mut self, loan_id: LoanId) -> Result<Vec<LoanGuarantor>, LoanError> {
        self.ensure_loan_locked(loan_id)?;
        let mut stored = self.state.read().await.guarantors_of(loan_id);
        for guarantor in stored.iter_mut() {
            if let Some(staged) = self.guarantors.get(&guarantor.id) {
                *guarantor = staged.clone();
            }
        }
        stored.extend(
            self.new_guarantors
                .iter()
                .filter_map(|id| self.guarantors.get(id))
                .filter(|g| g.loan_id == loan_id)
                .cloned(),
        );
        Ok(stored)
    }

    async fn insert_guarantor(&mut self, guarantor: &LoanGuarantor) -> Result<(), LoanError> {
        self.ensure_loan_locked(guarantor.loan_id)?;
        self.ensure_member_locked(guarantor.guarantor_member_id)?;
        self.guarantors.insert(guarantor.id, guarantor.clone());
        self.new_guarantors.push(guarantor.id);
        Ok(())
    }

    async fn update_guarantor(&mut self, guarantor: &LoanGuarantor) -> Result<(), LoanError> {
        self.ensure_loan_locked(guarantor.loan_id)?;
        let known = self.guarantors.contains_key(&guarantor.id)
            || self.state.read().await.guarantors.contains_key(&guarantor.id);
        if !known {
            return Err(LoanError::NotFound {
                entity: "Guarantor",
                id: guarantor.id.to_string(),
            });
        }
        self.guarantors.insert(guarantor.id, guarantor.clone());
        Ok(())
    }

    async fn commitments(&mut self, member_id: MemberId) -> Result<Vec<GuaranteeCommitment>, LoanError> {
        self.ensure_member_locked(member_id)?;
        let state = self.state.read().await;

        let stored = state.by_member.get(&member_id).into_iter().flatten();
        let staged = self.new_guarantors.iter();
        let mut seen = HashSet::new();

        Ok(stored
            .chain(staged)
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.guarantors.get(id).or_else(|| state.guarantors.get(id)))
            .filter(|g| g.guarantor_member_id == member_id)
            .filter_map(|g| self.view_loan(&state, g.loan_id).map(|loan| commitment(g, loan)))
            .collect())
    }

    async fn find_repayment(
        &mut self,
        loan_id: LoanId,
        reference: &str,
    ) -> Result<Option<LoanRepayment>, LoanError> {
        let matches = |r: &&LoanRepayment| r.loan_id == loan_id && r.reference == reference;
        if let Some(staged) = self.repayments.iter().find(matches) {
            return Ok(Some(staged.clone()));
        }
        let state = self.state.read().await;
        Ok(state
            .repayments
            .get(&loan_id)
            .and_then(|rows| rows.iter().find(matches))
            .cloned())
    }

    async fn insert_repayment(&mut self, repayment: &LoanRepayment) -> Result<(), LoanError> {
        self.ensure_loan_locked(repayment.loan_id)?;
        if self.find_repayment(repayment.loan_id, &repayment.reference).await?.is_some() {
            return Err(LoanError::DuplicateRepayment {
                loan_id: repayment.loan_id,
                reference: repayment.reference.clone(),
            });
        }
        self.repayments.push(repayment.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LoanError> {
        let this = *self;
        let mut state = this.state.write().await;

        for (id, loan) in this.loans {
            state.loans.insert(id, loan);
        }

        for id in &this.new_guarantors {
            if let Some(g) = this.guarantors.get(id) {
                state.by_loan.entry(g.loan_id).or_default().push(g.id);
                state.by_member.entry(g.guarantor_member_id).or_default().push(g.id);
            }
        }
        for (id, guarantor) in this.guarantors {
            state.guarantors.insert(id, guarantor);
        }

        for repayment in this.repayments {
            state.repayments.entry(repayment.loan_id).or_default().push(repayment);
        }

        Ok(())
    }
}
