//! Member savings accounts
//!
//! An account carries its product type, status and the stored balance. The
//! balance field is only ever written by the ledger store inside a unit of
//! work; everything in this module is plain data plus the rules that can be
//! decided from the account alone (status permissions, maturity lock, floor).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{MemberId, Money, Rate, SavingsAccountId};

use crate::error::LedgerError;

/// Savings product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Ordinary demand savings
    Regular,
    /// Term deposit locked until its maturity date
    Fixed,
    /// Goal savings with a target amount
    Target,
    Emergency,
    Retirement,
}

impl AccountType {
    /// Short code used in account numbers
    pub fn code(&self) -> &'static str {
        match self {
            AccountType::Regular => "REG",
            AccountType::Fixed => "FIX",
            AccountType::Target => "TGT",
            AccountType::Emergency => "EMG",
            AccountType::Retirement => "RET",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Regular => "regular",
            AccountType::Fixed => "fixed",
            AccountType::Target => "target",
            AccountType::Emergency => "emergency",
            AccountType::Retirement => "retirement",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "regular" => Some(AccountType::Regular),
            "fixed" => Some(AccountType::Fixed),
            "target" => Some(AccountType::Target),
            "emergency" => Some(AccountType::Emergency),
            "retirement" => Some(AccountType::Retirement),
            _ => None,
        }
    }
}

/// How often interest is credited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestPeriod {
    #[default]
    Monthly,
    Quarterly,
    Annually,
}

impl InterestPeriod {
    pub fn periods_per_year(&self) -> u32 {
        match self {
            InterestPeriod::Monthly => 12,
            InterestPeriod::Quarterly => 4,
            InterestPeriod::Annually => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InterestPeriod::Monthly => "monthly",
            InterestPeriod::Quarterly => "quarterly",
            InterestPeriod::Annually => "annually",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "monthly" => Some(InterestPeriod::Monthly),
            "quarterly" => Some(InterestPeriod::Quarterly),
            "annually" => Some(InterestPeriod::Annually),
            _ => None,
        }
    }
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    /// Dormant; accepts deposits only
    Inactive,
    /// Frozen by an administrator
    Suspended,
    Closed,
    /// Fixed deposit past maturity, awaiting payout
    Matured,
}

/// What a status permits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPermissions {
    pub allows_deposits: bool,
    pub allows_withdrawals: bool,
    pub can_be_closed: bool,
}

impl AccountStatus {
    /// Permission table for this status
    pub const fn permissions(self) -> StatusPermissions {
        let (allows_deposits, allows_withdrawals, can_be_closed) = match self {
            AccountStatus::Active => (true, true, true),
            AccountStatus::Inactive => (true, false, true),
            AccountStatus::Suspended => (false, false, false),
            AccountStatus::Matured => (false, true, true),
            AccountStatus::Closed => (false, false, false),
        };
        StatusPermissions {
            allows_deposits,
            allows_withdrawals,
            can_be_closed,
        }
    }

    /// Whether an administrative status change from `self` to `next` is allowed
    ///
    /// Statuses only move toward `Closed`, except that a suspension can be lifted.
    /// A suspended account must be reactivated before it can be closed.
    pub fn can_transition_to(self, next: AccountStatus) -> bool {
        use AccountStatus::*;
        matches!(
            (self, next),
            (Active, Inactive)
                | (Active, Suspended)
                | (Active, Matured)
                | (Active, Closed)
                | (Inactive, Suspended)
                | (Inactive, Closed)
                | (Suspended, Active)
                | (Matured, Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Closed => "closed",
            AccountStatus::Matured => "matured",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(AccountStatus::Active),
            "inactive" => Some(AccountStatus::Inactive),
            "suspended" => Some(AccountStatus::Suspended),
            "closed" => Some(AccountStatus::Closed),
            "matured" => Some(AccountStatus::Matured),
            _ => None,
        }
    }
}

/// Input for opening an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccountRequest {
    pub member_id: MemberId,
    pub account_type: AccountType,
    /// Posted as an opening deposit when positive
    pub opening_balance: Money,
    pub minimum_balance: Money,
    pub interest_rate: Rate,
    pub interest_period: InterestPeriod,
    pub maturity_date: Option<NaiveDate>,
    pub target_amount: Option<Money>,
    pub created_by: Option<String>,
}

impl OpenAccountRequest {
    /// A regular account with no minimum balance and no interest
    pub fn regular(member_id: MemberId) -> Self {
        Self {
            member_id,
            account_type: AccountType::Regular,
            opening_balance: Money::ZERO,
            minimum_balance: Money::ZERO,
            interest_rate: Rate::ZERO,
            interest_period: InterestPeriod::Monthly,
            maturity_date: None,
            target_amount: None,
            created_by: None,
        }
    }
}

/// A member's savings account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsAccount {
    pub id: SavingsAccountId,
    pub member_id: MemberId,
    /// Human-readable number, `SAV-<type code>-<8 digits>`
    pub account_number: String,
    pub account_type: AccountType,
    /// Stored balance; equals the net effect of all completed postings
    pub balance: Money,
    pub minimum_balance: Money,
    pub interest_rate: Rate,
    pub interest_period: InterestPeriod,
    pub maturity_date: Option<NaiveDate>,
    pub target_amount: Option<Money>,
    pub status: AccountStatus,
    pub created_by: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl SavingsAccount {
    /// Builds a new, zero-balance active account from an opening request
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` when the request breaks a product
    /// rule: negative amounts, a fixed account without a future maturity date,
    /// a target account without a positive target, or an opening balance
    /// below the minimum balance.
    pub fn open(
        request: &OpenAccountRequest,
        account_number: String,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if request.opening_balance.is_negative() {
            return Err(LedgerError::validation("opening balance cannot be negative"));
        }
        if request.minimum_balance.is_negative() {
            return Err(LedgerError::validation("minimum balance cannot be negative"));
        }
        if request.interest_rate.as_decimal().is_sign_negative() {
            return Err(LedgerError::validation("interest rate cannot be negative"));
        }
        if request.opening_balance.is_positive() && request.opening_balance < request.minimum_balance {
            return Err(LedgerError::validation(format!(
                "opening balance {} is below the minimum balance {}",
                request.opening_balance, request.minimum_balance
            )));
        }

        match request.account_type {
            AccountType::Fixed => match request.maturity_date {
                Some(date) if date > now.date_naive() => {}
                Some(_) => {
                    return Err(LedgerError::validation("maturity date must be in the future"))
                }
                None => {
                    return Err(LedgerError::validation("fixed accounts require a maturity date"))
                }
            },
            AccountType::Target => match request.target_amount {
                Some(target) if target.is_positive() => {}
                _ => {
                    return Err(LedgerError::validation(
                        "target accounts require a positive target amount",
                    ))
                }
            },
            _ => {}
        }

        Ok(Self {
            id: SavingsAccountId::new_v7(),
            member_id: request.member_id,
            account_number,
            account_type: request.account_type,
            balance: Money::ZERO,
            minimum_balance: request.minimum_balance,
            interest_rate: request.interest_rate,
            interest_period: request.interest_period,
            maturity_date: request.maturity_date,
            target_amount: request.target_amount,
            status: AccountStatus::Active,
            created_by: request.created_by.clone(),
            opened_at: now,
            updated_at: now,
            closed_at: None,
        })
    }

    pub fn permissions(&self) -> StatusPermissions {
        self.status.permissions()
    }

    /// True for a fixed deposit whose maturity date has not been reached
    pub fn is_locked_until_maturity(&self, today: NaiveDate) -> bool {
        self.account_type == AccountType::Fixed
            && self.maturity_date.map_or(false, |date| date > today)
    }

    /// Lowest balance a debit may leave behind
    ///
    /// The minimum balance applies to active accounts when enforcement is on;
    /// an authorized overdraft lowers the floor to zero and never below it.
    pub fn debit_floor(&self, enforce_minimum_balance: bool, allow_overdraft: bool) -> Money {
        if self.status == AccountStatus::Active && enforce_minimum_balance && !allow_overdraft {
            self.minimum_balance
        } else {
            Money::ZERO
        }
    }

    /// Closable when the status allows it and nothing is left in the account
    pub fn can_be_closed(&self) -> bool {
        self.permissions().can_be_closed && self.balance.is_zero()
    }

    /// Progress toward the target, as a fraction capped at one
    pub fn target_progress(&self) -> Option<rust_decimal::Decimal> {
        let target = self.target_amount?;
        if !target.is_positive() {
            return None;
        }
        let ratio = self.balance.amount() / target.amount();
        Some(ratio.min(rust_decimal::Decimal::ONE).max(rust_decimal::Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_permission_table() {
        let active = AccountStatus::Active.permissions();
        assert!(active.allows_deposits && active.allows_withdrawals && active.can_be_closed);

        let inactive = AccountStatus::Inactive.permissions();
        assert!(inactive.allows_deposits);
        assert!(!inactive.allows_withdrawals);

        let matured = AccountStatus::Matured.permissions();
        assert!(!matured.allows_deposits);
        assert!(matured.allows_withdrawals);

        for status in [AccountStatus::Suspended, AccountStatus::Closed] {
            let p = status.permissions();
            assert!(!p.allows_deposits && !p.allows_withdrawals && !p.can_be_closed);
        }
    }

    #[test]
    fn test_status_moves_toward_closed() {
        assert!(AccountStatus::Active.can_transition_to(AccountStatus::Suspended));
        assert!(AccountStatus::Suspended.can_transition_to(AccountStatus::Active));
        assert!(AccountStatus::Matured.can_transition_to(AccountStatus::Closed));
        assert!(!AccountStatus::Closed.can_transition_to(AccountStatus::Active));
        assert!(!AccountStatus::Suspended.can_transition_to(AccountStatus::Closed));
        assert!(!AccountStatus::Matured.can_transition_to(AccountStatus::Active));
        assert!(!AccountStatus::Active.can_transition_to(AccountStatus::Active));
    }

    #[test]
    fn test_fixed_account_requires_future_maturity() {
        let mut request = OpenAccountRequest::regular(MemberId::new());
        request.account_type = AccountType::Fixed;

        assert!(SavingsAccount::open(&request, "SAV-FIX-00000001".into(), now()).is_err());

        request.maturity_date = Some(now().date_naive());
        assert!(SavingsAccount::open(&request, "SAV-FIX-00000001".into(), now()).is_err());

        request.maturity_date = now().date_naive().succ_opt();
        let account = SavingsAccount::open(&request, "SAV-FIX-00000001".into(), now()).unwrap();
        assert!(account.is_locked_until_maturity(now().date_naive()));
    }

    #[test]
    fn test_target_account_requires_target() {
        let mut request = OpenAccountRequest::regular(MemberId::new());
        request.account_type = AccountType::Target;
        assert!(SavingsAccount::open(&request, "SAV-TGT-00000001".into(), now()).is_err());

        request.target_amount = Some(Money::from_major(1_000));
        let mut account = SavingsAccount::open(&request, "SAV-TGT-00000001".into(), now()).unwrap();
        account.balance = Money::from_major(250);
        assert_eq!(account.target_progress(), Some(dec!(0.25)));
    }

    #[test]
    fn test_opening_balance_below_minimum_rejected() {
        let mut request = OpenAccountRequest::regular(MemberId::new());
        request.minimum_balance = Money::from_major(500);
        request.opening_balance = Money::from_major(100);
        let err = SavingsAccount::open(&request, "SAV-REG-00000001".into(), now()).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_overdraft_lowers_floor_to_zero() {
        let mut request = OpenAccountRequest::regular(MemberId::new());
        request.minimum_balance = Money::from_major(500);
        let account = SavingsAccount::open(&request, "SAV-REG-00000001".into(), now()).unwrap();

        assert_eq!(account.debit_floor(true, false), Money::from_major(500));
        assert_eq!(account.debit_floor(true, true), Money::ZERO);
        assert_eq!(account.debit_floor(false, false), Money::ZERO);
    }
}
