//! Loan guarantors

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{GuarantorId, LoanId, MemberId, Money};

use crate::error::LoanError;

/// What a guarantor commits to: a fixed sum or a share of the principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GuaranteeTerms {
    Amount(Money),
    /// Percentage of the loan principal, 0 < p <= 100
    Percentage(Decimal),
}

impl GuaranteeTerms {
    /// Builds terms from the two stored columns
    ///
    /// A positive amount is authoritative; otherwise a positive percentage is
    /// used. At least one of them must be positive.
    pub fn from_parts(amount: Option<Money>, percentage: Option<Decimal>) -> Result<Self, LoanError> {
        match (amount, percentage) {
            (Some(amount), _) if amount.is_positive() => Ok(GuaranteeTerms::Amount(amount)),
            (_, Some(pct)) if pct > Decimal::ZERO => Ok(GuaranteeTerms::Percentage(pct)),
            _ => Err(LoanError::validation(
                "a guarantee needs a positive amount or percentage",
            )),
        }
    }

    pub fn validate(&self) -> Result<(), LoanError> {
        match self {
            GuaranteeTerms::Amount(amount) if !amount.is_positive() => {
                Err(LoanError::validation("guarantee amount must be positive"))
            }
            GuaranteeTerms::Percentage(pct) if *pct <= Decimal::ZERO || *pct > dec!(100) => Err(
                LoanError::validation("guarantee percentage must be in (0, 100]"),
            ),
            _ => Ok(()),
        }
    }

    /// Absolute guaranteed amount against a loan principal
    pub fn resolve(&self, principal: Money) -> Money {
        match self {
            GuaranteeTerms::Amount(amount) => *amount,
            GuaranteeTerms::Percentage(pct) => (principal * (*pct / dec!(100))).round_to_cents(),
        }
    }

    pub fn amount(&self) -> Option<Money> {
        match self {
            GuaranteeTerms::Amount(amount) => Some(*amount),
            GuaranteeTerms::Percentage(_) => None,
        }
    }

    pub fn percentage(&self) -> Option<Decimal> {
        match self {
            GuaranteeTerms::Percentage(pct) => Some(*pct),
            GuaranteeTerms::Amount(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuarantorType {
    #[default]
    Individual,
    Group,
    Institution,
}

impl GuarantorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuarantorType::Individual => "individual",
            GuarantorType::Group => "group",
            GuarantorType::Institution => "institution",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "individual" => Some(GuarantorType::Individual),
            "group" => Some(GuarantorType::Group),
            "institution" => Some(GuarantorType::Institution),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuarantorStatus {
    /// Counts toward the guarantor's exposure
    Active,
    Inactive,
    /// Loan settled, rejected or cancelled
    Released,
    /// Loan defaulted while guaranteed
    Defaulted,
}

impl GuarantorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuarantorStatus::Active => "active",
            GuarantorStatus::Inactive => "inactive",
            GuarantorStatus::Released => "released",
            GuarantorStatus::Defaulted => "defaulted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(GuarantorStatus::Active),
            "inactive" => Some(GuarantorStatus::Inactive),
            "released" => Some(GuarantorStatus::Released),
            "defaulted" => Some(GuarantorStatus::Defaulted),
            _ => None,
        }
    }
}

/// Request to attach a guarantor to a pending loan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuarantorRequest {
    pub guarantor_member_id: MemberId,
    pub terms: GuaranteeTerms,
    #[serde(default)]
    pub guarantor_type: GuarantorType,
}

/// A member guaranteeing a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanGuarantor {
    pub id: GuarantorId,
    pub loan_id: LoanId,
    pub guarantor_member_id: MemberId,
    pub terms: GuaranteeTerms,
    pub guarantor_type: GuarantorType,
    pub status: GuarantorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanGuarantor {
    pub fn new(loan_id: LoanId, request: &GuarantorRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: GuarantorId::new_v7(),
            loan_id,
            guarantor_member_id: request.guarantor_member_id,
            terms: request.terms,
            guarantor_type: request.guarantor_type,
            status: GuarantorStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GuarantorStatus::Active
    }

    /// Moves an active guarantee to a settled status; other statuses are left alone
    pub fn settle(&mut self, status: GuarantorStatus, now: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = status;
        self.updated_at = now;
        true
    }
}
