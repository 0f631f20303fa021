//! Loan DTOs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{LoanId, MemberId, Money, SavingsAccountId};
use domain_loan::{
    GuaranteeTerms, GuarantorRequest, GuarantorType, Loan, LoanApplication, LoanDisplayStatus,
    LoanError, LoanStatus, RepaymentSource,
};

use super::positive_amount;

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitLoanBody {
    pub member_id: Uuid,
    #[validate(custom(function = "positive_amount"))]
    pub principal: Decimal,
    #[validate(length(min = 1, max = 255))]
    pub purpose: String,
    #[validate(range(min = 1))]
    pub term_months: u32,
    pub annual_rate_percent: Decimal,
    pub disbursement_account: Uuid,
}

impl From<SubmitLoanBody> for LoanApplication {
    fn from(body: SubmitLoanBody) -> Self {
        LoanApplication {
            member_id: MemberId::from_uuid(body.member_id),
            principal: Money::new(body.principal),
            purpose: body.purpose,
            term_months: body.term_months,
            annual_rate_percent: body.annual_rate_percent,
            disbursement_account: SavingsAccountId::from_uuid(body.disbursement_account),
        }
    }
}

/// Exactly one of `guarantee_amount` and `guarantee_percentage` is expected
#[derive(Debug, Deserialize)]
pub struct GuarantorBody {
    pub guarantor_member_id: Uuid,
    pub guarantee_amount: Option<Decimal>,
    pub guarantee_percentage: Option<Decimal>,
    #[serde(default)]
    pub guarantor_type: GuarantorType,
}

impl TryFrom<GuarantorBody> for GuarantorRequest {
    type Error = LoanError;

    fn try_from(body: GuarantorBody) -> Result<Self, Self::Error> {
        if body.guarantee_amount.is_some() && body.guarantee_percentage.is_some() {
            return Err(LoanError::validation(
                "give either a guarantee amount or a percentage, not both",
            ));
        }
        Ok(GuarantorRequest {
            guarantor_member_id: MemberId::from_uuid(body.guarantor_member_id),
            terms: GuaranteeTerms::from_parts(
                body.guarantee_amount.map(Money::new),
                body.guarantee_percentage,
            )?,
            guarantor_type: body.guarantor_type,
        })
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReasonBody {
    #[validate(length(max = 255))]
    pub reason: Option<String>,
}

/// Debits `account_id` when given; otherwise records an external payment
/// under `reference`
#[derive(Debug, Deserialize, Validate)]
pub struct RepaymentBody {
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    pub account_id: Option<Uuid>,
    #[validate(length(min = 1, max = 64))]
    pub reference: Option<String>,
}

impl RepaymentBody {
    pub fn source(&self) -> Result<RepaymentSource, LoanError> {
        match (self.account_id, &self.reference) {
            (Some(account_id), reference) => Ok(RepaymentSource::Account {
                account_id: SavingsAccountId::from_uuid(account_id),
                reference: reference.clone(),
            }),
            (None, Some(reference)) => Ok(RepaymentSource::External {
                reference: reference.clone(),
            }),
            (None, None) => Err(LoanError::validation(
                "an external repayment needs a reference",
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CapacityQuery {
    pub amount: Decimal,
}

/// A loan with its derived figures
#[derive(Debug, Serialize)]
pub struct LoanResponse {
    #[serde(flatten)]
    pub loan: Loan,
    pub display_status: LoanDisplayStatus,
    pub remaining_balance: Money,
    pub total_payable: Money,
}

impl LoanResponse {
    pub fn new(loan: Loan, today: NaiveDate) -> Self {
        Self {
            display_status: loan.display_status(today),
            remaining_balance: loan.remaining_balance(),
            total_payable: loan.total_payable(),
            loan,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoanActionResponse {
    pub loan_id: LoanId,
    pub status: LoanStatus,
}
