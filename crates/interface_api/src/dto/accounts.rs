//! Account and transaction DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{MemberId, Money, Rate, SavingsAccountId};
use domain_savings::{
    AccountStatus, AccountType, InterestPeriod, OpenAccountRequest, PaymentMethod, PostRequest,
    TransactionStatus, TransactionType, TransferRequest,
};

use super::positive_amount;

#[derive(Debug, Deserialize, Validate)]
pub struct OpenAccountBody {
    pub member_id: Uuid,
    pub account_type: AccountType,
    #[serde(default)]
    pub opening_balance: Decimal,
    #[serde(default)]
    pub minimum_balance: Decimal,
    /// Annual rate in percent
    #[serde(default)]
    pub interest_rate_percent: Decimal,
    #[serde(default = "default_interest_period")]
    pub interest_period: InterestPeriod,
    pub maturity_date: Option<NaiveDate>,
    pub target_amount: Option<Decimal>,
    #[validate(length(min = 1, max = 100))]
    pub created_by: Option<String>,
}

fn default_interest_period() -> InterestPeriod {
    InterestPeriod::Monthly
}

impl From<OpenAccountBody> for OpenAccountRequest {
    fn from(body: OpenAccountBody) -> Self {
        OpenAccountRequest {
            member_id: MemberId::from_uuid(body.member_id),
            account_type: body.account_type,
            opening_balance: Money::new(body.opening_balance),
            minimum_balance: Money::new(body.minimum_balance),
            interest_rate: Rate::from_percentage(body.interest_rate_percent),
            interest_period: body.interest_period,
            maturity_date: body.maturity_date,
            target_amount: body.target_amount.map(Money::new),
            created_by: body.created_by,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountStatusBody {
    pub status: AccountStatus,
}

#[derive(Debug, Serialize)]
pub struct CloseAccountResponse {
    pub account_id: SavingsAccountId,
    pub closed: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PostTransactionBody {
    pub transaction_type: TransactionType,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    #[serde(default)]
    pub fees: Decimal,
    #[validate(length(min = 1, max = 64))]
    pub reference_number: Option<String>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub pre_approved: bool,
    #[serde(default)]
    pub allow_overdraft: bool,
}

impl PostTransactionBody {
    pub fn into_request(self, account_id: SavingsAccountId) -> PostRequest {
        let mut request = PostRequest::new(account_id, self.transaction_type, Money::new(self.amount))
            .with_fees(Money::new(self.fees))
            .with_payment_method(self.payment_method);
        if let Some(reference) = self.reference_number {
            request = request.with_reference(reference);
        }
        if let Some(description) = self.description {
            request = request.with_description(description);
        }
        if self.pre_approved {
            request = request.pre_approved();
        }
        if self.allow_overdraft {
            request = request.allow_overdraft();
        }
        request
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransferBody {
    pub from_account: Uuid,
    pub to_account: Uuid,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    #[serde(default)]
    pub fees: Decimal,
    #[validate(length(min = 1, max = 64))]
    pub reference_number: Option<String>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

impl From<TransferBody> for TransferRequest {
    fn from(body: TransferBody) -> Self {
        TransferRequest {
            from_account: SavingsAccountId::from_uuid(body.from_account),
            to_account: SavingsAccountId::from_uuid(body.to_account),
            amount: Money::new(body.amount),
            fees_charged: Money::new(body.fees),
            reference_number: body.reference_number,
            description: body.description,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionStatusBody {
    pub status: TransactionStatus,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReverseBody {
    #[validate(length(max = 255))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InterestBody {
    /// Period label, e.g. `2024-01`; the posting reference is derived from it
    #[validate(length(min = 1, max = 32))]
    pub period: String,
}

#[derive(Debug, Deserialize)]
pub struct StatementQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_post_body_defaults_and_flags() {
        let body: PostTransactionBody = serde_json::from_str(
            r#"{"transaction_type":"withdrawal","amount":"25.50","reference_number":"W-1","pre_approved":true}"#,
        )
        .unwrap();
        assert!(body.validate().is_ok());

        let request = body.into_request(SavingsAccountId::new());
        assert_eq!(request.transaction_type, TransactionType::Withdrawal);
        assert_eq!(request.amount, Money::new(dec!(25.50)));
        assert!(request.fees_charged.is_zero());
        assert_eq!(request.reference(), Some("W-1"));
    }

    #[test]
    fn test_post_body_rejects_zero_amount_and_long_reference() {
        let body = PostTransactionBody {
            transaction_type: TransactionType::Deposit,
            amount: Decimal::ZERO,
            fees: Decimal::ZERO,
            reference_number: Some("x".repeat(65)),
            description: None,
            payment_method: PaymentMethod::default(),
            pre_approved: false,
            allow_overdraft: false,
        };
        let errors = body.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("amount"));
        assert!(fields.contains_key("reference_number"));
    }

    #[test]
    fn test_open_body_converts_percentage_rate() {
        let body: OpenAccountBody = serde_json::from_str(&format!(
            r#"{{"member_id":"{}","account_type":"regular","interest_rate_percent":"4.5"}}"#,
            Uuid::new_v4()
        ))
        .unwrap();
        let request = OpenAccountRequest::from(body);
        assert_eq!(request.interest_rate, Rate::from_percentage(dec!(4.5)));
        assert_eq!(request.interest_period, InterestPeriod::Monthly);
    }
}
