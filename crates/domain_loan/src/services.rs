//! Loan underwriting service
//!
//! Drives a loan through its lifecycle. Loan and guarantor state is owned
//! here; every cash movement goes through [`LedgerStore::post`] so savings
//! balances are only ever changed by the ledger.
//!
//! A step that fails leaves the loan in its prior status: loan writes are
//! staged in a unit of work that is only committed once every check and the
//! ledger posting have succeeded. Ledger postings carry deterministic
//! references, so retrying a step whose loan commit failed after the posting
//! went through collapses onto the existing posting.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use core_kernel::{Clock, LoanId, MemberId, Money, RepaymentId};
use domain_savings::{LedgerStore, PaymentMethod, PostRequest};

use crate::amortization::{self, ScheduleEntry};
use crate::config::{ExposureLimits, LoanLimits};
use crate::error::LoanError;
use crate::exposure::{ExposureDecision, GuarantorExposureValidator};
use crate::guarantor::{GuarantorRequest, GuarantorStatus, LoanGuarantor};
use crate::loan::{Loan, LoanApplication, LoanRepayment, LoanStatus, RepaymentSource};
use crate::ports::{LockScope, LoanRepository, LoanUnitOfWork};

/// Approval re-reads the guarantor set under lock; this bounds how often it
/// starts over when the set changed in between
const APPROVAL_ATTEMPTS: usize = 3;

/// Result of [`LoanUnderwritingService::record_repayment`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepaymentReceipt {
    pub repayment: LoanRepayment,
    pub loan: Loan,
    /// True when the reference had already been recorded with this amount
    pub replayed: bool,
}

/// Orchestrates amortization, exposure checks and ledger postings
pub struct LoanUnderwritingService {
    repository: Arc<dyn LoanRepository>,
    ledger: Arc<LedgerStore>,
    exposure: GuarantorExposureValidator,
    limits: LoanLimits,
    clock: Arc<dyn Clock>,
}

impl LoanUnderwritingService {
    pub fn new(
        repository: Arc<dyn LoanRepository>,
        ledger: Arc<LedgerStore>,
        limits: LoanLimits,
        exposure_limits: ExposureLimits,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let exposure = GuarantorExposureValidator::new(Arc::clone(&repository), exposure_limits);
        Self {
            repository,
            ledger,
            exposure,
            limits,
            clock,
        }
    }

    pub fn limits(&self) -> &LoanLimits {
        &self.limits
    }

    pub fn exposure(&self) -> &GuarantorExposureValidator {
        &self.exposure
    }

    async fn begin(&self, scope: &LockScope) -> Result<Box<dyn LoanUnitOfWork>, LoanError> {
        self.repository
            .begin(scope, self.limits.lock_timeout())
            .await
            .inspect_err(|e| {
                if e.is_retryable() {
                    warn!(?scope, error = %e, "Loan lock not granted");
                }
            })
    }

    fn validate_application(&self, application: &LoanApplication) -> Result<(), LoanError> {
        if !application.principal.is_positive() {
            return Err(LoanError::validation("principal must be positive"));
        }
        let term = application.term_months;
        if term < self.limits.min_term_months || term > self.limits.max_term_months {
            return Err(LoanError::validation(format!(
                "term must be between {} and {} months",
                self.limits.min_term_months, self.limits.max_term_months
            )));
        }
        let rate = application.annual_rate_percent;
        if rate < self.limits.min_rate_percent || rate > self.limits.max_rate_percent {
            return Err(LoanError::validation(format!(
                "annual rate must be between {}% and {}%",
                self.limits.min_rate_percent, self.limits.max_rate_percent
            )));
        }
        if application.purpose.trim().is_empty() {
            return Err(LoanError::validation("purpose is required"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Application
    // ------------------------------------------------------------------

    /// Records a new application as `Pending` with its installment quoted
    ///
    /// # Errors
    ///
    /// - `Validation` for out-of-range principal, term or rate, a blank
    ///   purpose, or a disbursement account owned by another member
    /// - `NotFound` (via the ledger) when the disbursement account is unknown
    #[instrument(skip(self, application), fields(member_id = %application.member_id, principal = %application.principal))]
    pub async fn submit(&self, application: LoanApplication) -> Result<Loan, LoanError> {
        self.validate_application(&application)?;

        let account = self.ledger.get_account(application.disbursement_account).await?;
        if account.member_id != application.member_id {
            return Err(LoanError::validation(
                "disbursement account belongs to another member",
            ));
        }

        let quote = amortization::compute_schedule(
            application.principal,
            application.annual_rate_percent,
            application.term_months,
        );
        if !quote.monthly_payment.is_positive() {
            return Err(LoanError::validation("loan terms yield no installment"));
        }

        let loan = Loan::submit(&application, quote, self.clock.now());
        let mut uow = self.begin(&LockScope::loan(loan.id)).await?;
        uow.insert_loan(&loan).await?;
        uow.commit().await?;

        info!(
            loan_id = %loan.id,
            monthly_payment = %loan.monthly_payment,
            total_interest = %loan.total_interest,
            "Loan application submitted"
        );
        Ok(loan)
    }

    /// Registers a guarantor on a pending loan
    ///
    /// The exposure check and the insert share one unit of work holding the
    /// guarantor member's lock, so concurrent registrations for the same
    /// member are evaluated one after the other.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` unless the loan is `Pending`
    /// - `Validation` for bad terms, a self-guarantee or a repeated guarantor
    /// - `GuarantorExposureExceeded` when a cap would be broken
    #[instrument(skip(self, request), fields(guarantor = %request.guarantor_member_id))]
    pub async fn add_guarantor(
        &self,
        loan_id: LoanId,
        request: GuarantorRequest,
    ) -> Result<LoanGuarantor, LoanError> {
        request.terms.validate()?;
        let member_id = request.guarantor_member_id;

        let scope = LockScope::loan(loan_id).with_guarantors([member_id]);
        let mut uow = self.begin(&scope).await?;
        let loan = uow.loan(loan_id).await?;
        loan.ensure_status(LoanStatus::Pending, "add a guarantor to")?;

        if member_id == loan.member_id {
            return Err(LoanError::validation("a borrower cannot guarantee their own loan"));
        }
        let already = uow
            .guarantors(loan_id)
            .await?
            .iter()
            .any(|g| g.is_active() && g.guarantor_member_id == member_id);
        if already {
            return Err(LoanError::validation(format!(
                "member {member_id} already guarantees this loan"
            )));
        }

        let amount = request.terms.resolve(loan.principal);
        let decision = self
            .exposure
            .check_locked(uow.as_mut(), member_id, amount, Some(loan_id))
            .await?;
        if let Some(reason) = decision.reason {
            info!(%loan_id, %member_id, %reason, "Guarantee refused");
            return Err(LoanError::GuarantorExposureExceeded {
                guarantor: member_id,
                reason,
            });
        }

        let guarantor = LoanGuarantor::new(loan_id, &request, self.clock.now());
        uow.insert_guarantor(&guarantor).await?;
        uow.commit().await?;

        info!(%loan_id, %member_id, amount = %amount, "Guarantor registered");
        Ok(guarantor)
    }

    // ------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------

    /// Approves a pending loan after re-checking every active guarantor
    ///
    /// The first guarantor over a cap fails the whole approval and is named
    /// in the error.
    #[instrument(skip(self))]
    pub async fn approve(&self, loan_id: LoanId) -> Result<Loan, LoanError> {
        for attempt in 1..=APPROVAL_ATTEMPTS {
            let expected = active_members(&self.repository.guarantors_for_loan(loan_id).await?);
            let scope = LockScope::loan(loan_id).with_guarantors(expected.iter().copied());
            let mut uow = self.begin(&scope).await?;

            let mut loan = uow.loan(loan_id).await?;
            loan.ensure_status(LoanStatus::Pending, "approve")?;

            let mut guarantors: Vec<LoanGuarantor> = uow
                .guarantors(loan_id)
                .await?
                .into_iter()
                .filter(LoanGuarantor::is_active)
                .collect();
            if active_members(&guarantors) != expected {
                debug!(attempt, "Guarantor set changed before lock; retrying");
                continue;
            }
            guarantors.sort_by_key(|g| g.created_at);

            for guarantor in &guarantors {
                let amount = guarantor.terms.resolve(loan.principal);
                let decision = self
                    .exposure
                    .check_locked(uow.as_mut(), guarantor.guarantor_member_id, amount, Some(loan_id))
                    .await?;
                if let Some(reason) = decision.reason {
                    info!(%loan_id, guarantor = %guarantor.guarantor_member_id, %reason, "Approval blocked");
                    return Err(LoanError::GuarantorExposureExceeded {
                        guarantor: guarantor.guarantor_member_id,
                        reason,
                    });
                }
            }

            loan.approve(self.clock.now())?;
            uow.update_loan(&loan).await?;
            uow.commit().await?;

            info!(%loan_id, guarantors = guarantors.len(), "Loan approved");
            return Ok(loan);
        }

        Err(LoanError::LockTimeout {
            resource: loan_id.to_string(),
            waited_ms: self.limits.lock_timeout_ms,
        })
    }

    /// Rejects a pending or approved loan and releases its guarantees
    #[instrument(skip(self, reason))]
    pub async fn reject(&self, loan_id: LoanId, reason: Option<String>) -> Result<Loan, LoanError> {
        self.close_unfunded(loan_id, LoanStatus::Rejected, reason).await
    }

    /// Cancels a pending or approved loan and releases its guarantees
    #[instrument(skip(self, reason))]
    pub async fn cancel(&self, loan_id: LoanId, reason: Option<String>) -> Result<Loan, LoanError> {
        self.close_unfunded(loan_id, LoanStatus::Cancelled, reason).await
    }

    async fn close_unfunded(
        &self,
        loan_id: LoanId,
        status: LoanStatus,
        reason: Option<String>,
    ) -> Result<Loan, LoanError> {
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let mut uow = self.begin(&LockScope::loan(loan_id)).await?;
        let mut loan = uow.loan(loan_id).await?;
        let now = self.clock.now();

        loan.close_unfunded(status, reason, now)?;
        let released = settle_guarantees(uow.as_mut(), loan_id, GuarantorStatus::Released, now).await?;
        uow.update_loan(&loan).await?;
        uow.commit().await?;

        info!(%loan_id, status = loan.status.as_str(), released, "Loan closed before disbursement");
        Ok(loan)
    }

    // ------------------------------------------------------------------
    // Cash movements
    // ------------------------------------------------------------------

    /// Pays the principal into the borrower's designated account
    ///
    /// Fixes the installment, posts one pre-approved deposit of the principal
    /// with reference `LOAN-DISB-<loan id>` and activates the loan with its
    /// first payment due one month out.
    ///
    /// # Errors
    ///
    /// `InvalidStateTransition` unless the loan is `Approved`; any ledger
    /// failure is passed through and the loan stays `Approved`.
    #[instrument(skip(self))]
    pub async fn disburse(&self, loan_id: LoanId) -> Result<Loan, LoanError> {
        let mut uow = self.begin(&LockScope::loan(loan_id)).await?;
        let mut loan = uow.loan(loan_id).await?;
        loan.ensure_status(LoanStatus::Approved, "disburse")?;

        let schedule =
            amortization::compute_schedule(loan.principal, loan.annual_rate_percent, loan.term_months);

        let posting = PostRequest::deposit(loan.disbursement_account, loan.principal)
            .with_reference(format!("LOAN-DISB-{}", loan.id))
            .with_description(format!("Disbursement of loan {}", loan.id))
            .with_payment_method(PaymentMethod::Internal)
            .pre_approved();
        let transaction = self.ledger.post(posting).await?;

        loan.activate(schedule, transaction.id, self.clock.now())?;
        uow.update_loan(&loan).await?;
        uow.commit().await?;

        info!(
            %loan_id,
            account_id = %loan.disbursement_account,
            amount = %loan.principal,
            transaction_id = %transaction.id,
            "Loan disbursed"
        );
        Ok(loan)
    }

    /// Books a repayment against an active loan
    ///
    /// An `Account` source is debited through the ledger as a pre-approved
    /// withdrawal; an `External` source only records its reference. Without
    /// an explicit reference the repayment is keyed
    /// `LOAN-REPAY-<loan id>-<n>`. Re-submitting a reference with the same
    /// amount returns the recorded repayment.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive amount, a blank external reference,
    ///   or an amount above the remaining balance
    /// - `DuplicateRepayment` for a reused reference with another amount
    /// - `InvalidStateTransition` unless the loan is `Active`
    /// - ledger errors (`InsufficientFunds`, `AccountNotPostable`, ...) unchanged
    #[instrument(skip(self, source))]
    pub async fn record_repayment(
        &self,
        loan_id: LoanId,
        source: RepaymentSource,
        amount: Money,
    ) -> Result<RepaymentReceipt, LoanError> {
        if !amount.is_positive() {
            return Err(LoanError::validation("repayment amount must be positive"));
        }

        let mut uow = self.begin(&LockScope::loan(loan_id)).await?;
        let mut loan = uow.loan(loan_id).await?;

        let (reference, account) = match &source {
            RepaymentSource::Account { account_id, reference } => {
                let reference = reference
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        format!("LOAN-REPAY-{}-{}", loan.id, loan.repayment_count + 1)
                    });
                (reference, Some(*account_id))
            }
            RepaymentSource::External { reference } => {
                let reference = reference.trim();
                if reference.is_empty() {
                    return Err(LoanError::validation("external repayments need a reference"));
                }
                (reference.to_string(), None)
            }
        };

        if let Some(existing) = uow.find_repayment(loan_id, &reference).await? {
            if existing.amount == amount {
                debug!(%loan_id, %reference, "Repayment already recorded");
                return Ok(RepaymentReceipt {
                    repayment: existing,
                    loan,
                    replayed: true,
                });
            }
            return Err(LoanError::DuplicateRepayment { loan_id, reference });
        }

        loan.ensure_status(LoanStatus::Active, "repay")?;
        let remaining = loan.remaining_balance();
        if amount > remaining {
            return Err(LoanError::validation(format!(
                "repayment {amount} exceeds remaining balance {remaining}"
            )));
        }

        let transaction_id = match account {
            Some(account_id) => {
                let posting = PostRequest::withdrawal(account_id, amount)
                    .with_reference(reference.clone())
                    .with_description(format!("Repayment of loan {}", loan.id))
                    .with_payment_method(PaymentMethod::Internal)
                    .pre_approved();
                Some(self.ledger.post(posting).await?.id)
            }
            None => None,
        };

        let now = self.clock.now();
        let settled = loan.apply_repayment(amount, now)?;
        if settled {
            settle_guarantees(uow.as_mut(), loan_id, GuarantorStatus::Released, now).await?;
        }

        let repayment = LoanRepayment {
            id: RepaymentId::new_v7(),
            loan_id,
            amount,
            reference,
            source_account: account,
            transaction_id,
            paid_at: now,
        };
        uow.insert_repayment(&repayment).await?;
        uow.update_loan(&loan).await?;
        uow.commit().await?;

        info!(
            %loan_id,
            reference = %repayment.reference,
            total_repaid = %loan.total_repaid,
            remaining = %loan.remaining_balance(),
            settled,
            "Repayment recorded"
        );
        Ok(RepaymentReceipt {
            repayment,
            loan,
            replayed: false,
        })
    }

    /// Writes off an active loan; its guarantees become `Defaulted`
    #[instrument(skip(self))]
    pub async fn mark_defaulted(&self, loan_id: LoanId) -> Result<Loan, LoanError> {
        let mut uow = self.begin(&LockScope::loan(loan_id)).await?;
        let mut loan = uow.loan(loan_id).await?;
        let now = self.clock.now();

        loan.mark_defaulted(now)?;
        let settled = settle_guarantees(uow.as_mut(), loan_id, GuarantorStatus::Defaulted, now).await?;
        uow.update_loan(&loan).await?;
        uow.commit().await?;

        warn!(%loan_id, remaining = %loan.remaining_balance(), guarantors = settled, "Loan defaulted");
        Ok(loan)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_loan(&self, loan_id: LoanId) -> Result<Loan, LoanError> {
        self.repository
            .find_loan(loan_id)
            .await?
            .ok_or_else(|| LoanError::loan_not_found(loan_id))
    }

    pub async fn list_guarantors(&self, loan_id: LoanId) -> Result<Vec<LoanGuarantor>, LoanError> {
        self.get_loan(loan_id).await?;
        self.repository.guarantors_for_loan(loan_id).await
    }

    pub async fn list_repayments(&self, loan_id: LoanId) -> Result<Vec<LoanRepayment>, LoanError> {
        self.get_loan(loan_id).await?;
        self.repository.repayments_for_loan(loan_id).await
    }

    /// Month-by-month schedule, dated from disbursement (or today if the
    /// loan has not been disbursed yet)
    pub async fn repayment_schedule(&self, loan_id: LoanId) -> Result<Vec<ScheduleEntry>, LoanError> {
        let loan = self.get_loan(loan_id).await?;
        let start = loan.disbursement_date.unwrap_or_else(|| self.clock.today());
        Ok(amortization::repayment_table(
            loan.principal,
            loan.annual_rate_percent,
            loan.term_months,
            start,
        ))
    }

    /// Whether a member could take on a further guarantee of `proposed`
    pub async fn can_guarantee(
        &self,
        member_id: MemberId,
        proposed: Money,
    ) -> Result<ExposureDecision, LoanError> {
        self.exposure.can_guarantee(member_id, proposed).await
    }
}

impl std::fmt::Debug for LoanUnderwritingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoanUnderwritingService")
            .field("limits", &self.limits)
            .field("exposure", self.exposure.limits())
            .finish_non_exhaustive()
    }
}

fn active_members(guarantors: &[LoanGuarantor]) -> BTreeSet<MemberId> {
    guarantors
        .iter()
        .filter(|g| g.is_active())
        .map(|g| g.guarantor_member_id)
        .collect()
}

/// Moves every active guarantee of a loan to `status`; returns how many moved
async fn settle_guarantees(
    uow: &mut dyn LoanUnitOfWork,
    loan_id: LoanId,
    status: GuarantorStatus,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<usize, LoanError> {
    let mut settled = 0;
    for mut guarantor in uow.guarantors(loan_id).await? {
        if guarantor.settle(status, now) {
            uow.update_guarantor(&guarantor).await?;
            settled += 1;
        }
    }
    Ok(settled)
}
