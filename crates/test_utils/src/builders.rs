//! Test Data Builders
//!
//! Builders for the request types the services accept. Tests set only the
//! fields they care about; everything else defaults to a valid value.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{MemberId, Money, Rate, SavingsAccountId};
use domain_loan::{GuaranteeTerms, GuarantorRequest, GuarantorType, LoanApplication};
use domain_savings::{AccountType, InterestPeriod, OpenAccountRequest};

/// Builder for [`OpenAccountRequest`]
pub struct OpenAccountBuilder {
    request: OpenAccountRequest,
}

impl Default for OpenAccountBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAccountBuilder {
    /// A regular, interest-free account for a fresh member
    pub fn new() -> Self {
        Self {
            request: OpenAccountRequest::regular(MemberId::new()),
        }
    }

    pub fn for_member(mut self, member_id: MemberId) -> Self {
        self.request.member_id = member_id;
        self
    }

    pub fn with_type(mut self, account_type: AccountType) -> Self {
        self.request.account_type = account_type;
        self
    }

    pub fn with_opening_balance(mut self, amount: Money) -> Self {
        self.request.opening_balance = amount;
        self
    }

    pub fn with_minimum_balance(mut self, amount: Money) -> Self {
        self.request.minimum_balance = amount;
        self
    }

    /// Sets the annual rate from a percentage such as `dec!(4.5)`
    pub fn with_interest(mut self, percentage: Decimal, period: InterestPeriod) -> Self {
        self.request.interest_rate = Rate::from_percentage(percentage);
        self.request.interest_period = period;
        self
    }

    /// A fixed deposit maturing on `date`
    pub fn fixed_until(mut self, date: NaiveDate) -> Self {
        self.request.account_type = AccountType::Fixed;
        self.request.maturity_date = Some(date);
        self
    }

    /// A target savings account aiming for `target`
    pub fn targeting(mut self, target: Money) -> Self {
        self.request.account_type = AccountType::Target;
        self.request.target_amount = Some(target);
        self
    }

    pub fn build(self) -> OpenAccountRequest {
        self.request
    }
}

/// Builder for [`LoanApplication`]
///
/// Defaults to 100,000 over 12 months at 12% per year.
pub struct LoanApplicationBuilder {
    application: LoanApplication,
}

impl LoanApplicationBuilder {
    pub fn new(member_id: MemberId, disbursement_account: SavingsAccountId) -> Self {
        Self {
            application: LoanApplication {
                member_id,
                principal: Money::from_major(100_000),
                purpose: "Working capital".to_string(),
                term_months: 12,
                annual_rate_percent: dec!(12),
                disbursement_account,
            },
        }
    }

    pub fn with_principal(mut self, principal: Money) -> Self {
        self.application.principal = principal;
        self
    }

    pub fn with_term(mut self, months: u32) -> Self {
        self.application.term_months = months;
        self
    }

    pub fn with_rate(mut self, annual_rate_percent: Decimal) -> Self {
        self.application.annual_rate_percent = annual_rate_percent;
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.application.purpose = purpose.into();
        self
    }

    pub fn build(self) -> LoanApplication {
        self.application
    }
}

/// A member guarantee for a fixed amount
pub fn guarantee(member_id: MemberId, amount: Money) -> GuarantorRequest {
    GuarantorRequest {
        guarantor_member_id: member_id,
        terms: GuaranteeTerms::Amount(amount),
        guarantor_type: GuarantorType::Individual,
    }
}

/// A member guarantee for a share of the principal
pub fn percentage_guarantee(member_id: MemberId, percentage: Decimal) -> GuarantorRequest {
    GuarantorRequest {
        guarantor_member_id: member_id,
        terms: GuaranteeTerms::Percentage(percentage),
        guarantor_type: GuarantorType::Individual,
    }
}
