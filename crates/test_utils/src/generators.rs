//! Property-Based Test Generators
//!
//! Proptest strategies producing amounts, rates and posting scripts that
//! respect the domain's input rules.

use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::Money;

/// Positive amounts from one cent up to ten million
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (1i64..1_000_000_000i64).prop_map(Money::from_minor)
}

/// Amounts small enough that a handful of them never reach the approval threshold
pub fn small_money_strategy() -> impl Strategy<Value = Money> {
    (1i64..500_000i64).prop_map(Money::from_minor)
}

/// Annual loan rates in percent with up to two decimals, 0% to 36%
pub fn annual_rate_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=3600i64).prop_map(|n| Decimal::new(n, 2))
}

/// Loan terms in months
pub fn term_months_strategy() -> impl Strategy<Value = u32> {
    1u32..=360u32
}

/// Loan principals between 1,000 and 1,000,000
pub fn principal_strategy() -> impl Strategy<Value = Money> {
    (1_000i64..=1_000_000i64).prop_map(Money::from_major)
}

/// One step of a posting script
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LedgerOp {
    Deposit(Money),
    Withdrawal(Money),
}

/// A short mix of deposits and withdrawals
pub fn ledger_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<LedgerOp>> {
    let op = prop_oneof![
        small_money_strategy().prop_map(LedgerOp::Deposit),
        small_money_strategy().prop_map(LedgerOp::Withdrawal),
    ];
    prop::collection::vec(op, 1..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_positive_money_is_positive(m in positive_money_strategy()) {
            prop_assert!(m.is_positive());
        }

        #[test]
        fn test_rates_stay_in_range(r in annual_rate_strategy()) {
            prop_assert!(r >= Decimal::ZERO && r <= Decimal::new(36, 0));
        }

        #[test]
        fn test_ops_are_non_empty(ops in ledger_ops_strategy(8)) {
            prop_assert!(!ops.is_empty() && ops.len() <= 8);
        }
    }
}
