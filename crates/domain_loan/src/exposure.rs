//! Guarantor exposure validator
//!
//! Two independent caps bound what a member may guarantee:
//!
//! - the number of simultaneous active guarantees
//! - the cumulative amount guaranteed on live (disbursed, repaying) loans
//!
//! The decision itself is a pure function over the member's commitments. The
//! underwriting service reads those commitments under the guarantor's lock and
//! inserts the new guarantee in the same unit of work, so two simultaneous
//! registrations cannot both pass the check and jointly exceed a cap.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use core_kernel::{GuarantorId, LoanId, MemberId, Money};

use crate::config::ExposureLimits;
use crate::error::LoanError;
use crate::guarantor::GuarantorStatus;
use crate::loan::LoanStatus;
use crate::ports::{LoanRepository, LoanUnitOfWork};

/// Machine-readable refusal reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExposureReason {
    TooManyGuarantees,
    ExposureExceeded,
}

impl ExposureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExposureReason::TooManyGuarantees => "TOO_MANY_GUARANTEES",
            ExposureReason::ExposureExceeded => "EXPOSURE_EXCEEDED",
        }
    }
}

impl fmt::Display for ExposureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One guarantee held by a member, with its loan's status and resolved amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuaranteeCommitment {
    pub guarantor_id: GuarantorId,
    pub loan_id: LoanId,
    pub loan_status: LoanStatus,
    pub guarantor_status: GuarantorStatus,
    pub amount: Money,
}

/// Outcome of an exposure check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureDecision {
    pub allowed: bool,
    pub reason: Option<ExposureReason>,
    pub current_exposure: Money,
    pub current_guarantees: u32,
    pub proposed_amount: Money,
}

/// Loan statuses whose guarantees count toward exposure
pub fn is_live(status: LoanStatus) -> bool {
    matches!(status, LoanStatus::Active)
}

/// Decides whether `proposed` more can be guaranteed
///
/// Guarantees on `excluding` (the loan under evaluation) are ignored so that
/// re-checking a loan's own guarantors at approval does not count them twice.
pub fn evaluate(
    commitments: &[GuaranteeCommitment],
    proposed: Money,
    limits: &ExposureLimits,
    excluding: Option<LoanId>,
) -> ExposureDecision {
    let active = commitments
        .iter()
        .filter(|c| c.guarantor_status == GuarantorStatus::Active)
        .filter(|c| Some(c.loan_id) != excluding);

    let mut current_guarantees = 0u32;
    let mut current_exposure = Money::ZERO;
    for commitment in active {
        current_guarantees += 1;
        if is_live(commitment.loan_status) {
            current_exposure = current_exposure.saturating_add(&commitment.amount);
        }
    }

    let reason = if current_guarantees >= limits.max_guarantees {
        Some(ExposureReason::TooManyGuarantees)
    } else if current_exposure.saturating_add(&proposed) > limits.max_exposure {
        Some(ExposureReason::ExposureExceeded)
    } else {
        None
    };

    ExposureDecision {
        allowed: reason.is_none(),
        reason,
        current_exposure,
        current_guarantees,
        proposed_amount: proposed,
    }
}

/// Applies [`ExposureLimits`] to a member's stored commitments
pub struct GuarantorExposureValidator {
    repository: Arc<dyn LoanRepository>,
    limits: ExposureLimits,
}

impl GuarantorExposureValidator {
    pub fn new(repository: Arc<dyn LoanRepository>, limits: ExposureLimits) -> Self {
        Self { repository, limits }
    }

    pub fn limits(&self) -> &ExposureLimits {
        &self.limits
    }

    /// Advisory check outside any lock
    ///
    /// The answer can be stale by the time a guarantee is registered; the
    /// binding check is [`GuarantorExposureValidator::check_locked`].
    pub async fn can_guarantee(
        &self,
        member_id: MemberId,
        proposed: Money,
    ) -> Result<ExposureDecision, LoanError> {
        if proposed.is_negative() {
            return Err(LoanError::validation("proposed guarantee cannot be negative"));
        }
        let commitments = self.repository.commitments_for_member(member_id).await?;
        Ok(evaluate(&commitments, proposed, &self.limits, None))
    }

    /// Check against commitments read inside a unit of work holding the
    /// member's lock
    pub async fn check_locked(
        &self,
        uow: &mut dyn LoanUnitOfWork,
        member_id: MemberId,
        proposed: Money,
        excluding: Option<LoanId>,
    ) -> Result<ExposureDecision, LoanError> {
        let commitments = uow.commitments(member_id).await?;
        let decision = evaluate(&commitments, proposed, &self.limits, excluding);
        debug!(
            %member_id,
            proposed = %proposed,
            current_exposure = %decision.current_exposure,
            current_guarantees = decision.current_guarantees,
            allowed = decision.allowed,
            "Guarantor exposure evaluated"
        );
        Ok(decision)
    }
}
