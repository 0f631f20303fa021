//! Money types with precise decimal arithmetic
//!
//! All monetary values in the ledger and loan domains are expressed as
//! [`Money`], a thin wrapper over `rust_decimal::Decimal`. The society operates
//! in a single currency, so no currency tag is carried. Amounts are stored
//! with at most 4 decimal places; presentation and posting round to cents
//! using round-half-up.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use thiserror::Error;

/// Internal storage precision
const STORAGE_DP: u32 = 4;

/// Posting precision (cents)
pub const CENT_DP: u32 = 2;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount
///
/// Money uses rust_decimal for exact arithmetic. Serialized as a decimal
/// string so no precision is lost across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    amount: Decimal,
}

impl Money {
    pub const ZERO: Money = Money { amount: Decimal::ZERO };

    /// Creates a new Money value, normalised to storage precision
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount: amount.round_dp_with_strategy(STORAGE_DP, RoundingStrategy::MidpointAwayFromZero),
        }
    }

    /// Creates Money from an integer amount in minor units (cents)
    pub fn from_minor(minor_units: i64) -> Self {
        Self::new(Decimal::new(minor_units, CENT_DP))
    }

    /// Creates Money from a whole number of currency units
    pub fn from_major(units: i64) -> Self {
        Self::new(Decimal::from(units))
    }

    /// Creates a zero amount
    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Returns true if the amount is strictly negative
    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self { amount: self.amount.abs() }
    }

    /// Rounds half away from zero to `dp` decimal places (commercial rounding)
    pub fn round_half_up(&self, dp: u32) -> Self {
        Self {
            amount: self.amount.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        }
    }

    /// Rounds to cents using round-half-up
    pub fn round_to_cents(&self) -> Self {
        self.round_half_up(CENT_DP)
    }

    /// Clamps negative values to zero
    pub fn floor_at_zero(&self) -> Self {
        if self.is_negative() {
            Self::ZERO
        } else {
            *self
        }
    }

    /// Checked addition
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.amount
            .checked_add(other.amount)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }

    /// Addition clamped at the representable bounds
    pub fn saturating_add(&self, other: &Money) -> Money {
        Self::new(self.amount.saturating_add(other.amount))
    }

    /// Checked subtraction
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.amount
            .checked_sub(other.amount)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }

    /// Multiplies by a scalar (e.g., for rate calculations)
    pub fn multiply(&self, factor: Decimal) -> Self {
        Self::new(self.amount * factor)
    }

    /// Checked multiplication by a scalar
    pub fn checked_mul(&self, factor: Decimal) -> Result<Money, MoneyError> {
        self.amount
            .checked_mul(factor)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }

    /// Divides by a scalar
    pub fn divide(&self, divisor: Decimal) -> Result<Self, MoneyError> {
        if divisor.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }
        self.amount
            .checked_div(divisor)
            .map(Self::new)
            .ok_or(MoneyError::Overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.amount)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.amount + other.amount)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.amount - other.amount)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self { amount: -self.amount }
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, factor: Decimal) -> Self {
        self.multiply(factor)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

/// Represents a percentage rate (e.g., interest rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Rate {
    /// The rate as a decimal (e.g., 0.05 for 5%)
    value: Decimal,
}

impl Rate {
    pub const ZERO: Rate = Rate { value: Decimal::ZERO };

    /// Creates a rate from a decimal value (e.g., 0.05 for 5%)
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Creates a rate from a percentage (e.g., 5.0 for 5%)
    pub fn from_percentage(percentage: Decimal) -> Self {
        Self {
            value: percentage / dec!(100),
        }
    }

    /// Returns the rate as a decimal
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.value * dec!(100)
    }

    /// Returns the equivalent simple monthly rate
    pub fn monthly(&self) -> Decimal {
        self.value / dec!(12)
    }

    /// Returns true if the rate is zero or negative
    pub fn is_non_positive(&self) -> bool {
        self.value <= Decimal::ZERO
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().round_dp(4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation() {
        let m = Money::new(dec!(100.50));
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_money_from_minor() {
        let m = Money::from_minor(10050);
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_storage_precision() {
        let m = Money::new(dec!(1.23456));
        assert_eq!(m.amount(), dec!(1.2346));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(Money::new(dec!(2.345)).round_to_cents().amount(), dec!(2.35));
        assert_eq!(Money::new(dec!(2.344)).round_to_cents().amount(), dec!(2.34));
        assert_eq!(Money::new(dec!(-2.345)).round_to_cents().amount(), dec!(-2.35));
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(dec!(100.00));
        let b = Money::new(dec!(50.00));

        assert_eq!((a + b).amount(), dec!(150.00));
        assert_eq!((a - b).amount(), dec!(50.00));
        assert_eq!((b - a).floor_at_zero(), Money::ZERO);
    }

    #[test]
    fn test_divide_by_zero() {
        let m = Money::from_major(10);
        assert_eq!(m.divide(Decimal::ZERO), Err(MoneyError::DivisionByZero));
    }

    #[test]
    fn test_monthly_rate() {
        let rate = Rate::from_percentage(dec!(12));
        assert_eq!(rate.monthly(), dec!(0.01));
        assert_eq!(Money::from_major(1000).multiply(rate.monthly()), Money::from_major(10));
    }

    #[test]
    fn test_checked_mul_overflow() {
        assert_eq!(Money::new(Decimal::MAX).checked_mul(dec!(2)), Err(MoneyError::Overflow));
        assert_eq!(Money::from_major(3).checked_mul(dec!(1.5)), Ok(Money::new(dec!(4.5))));
    }

    #[test]
    fn test_display_uses_cents() {
        assert_eq!(Money::new(dec!(10)).to_string(), "10.00");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn cent_rounding_is_stable_and_within_half_a_cent(minor in -10_000_000i64..10_000_000i64) {
            let money = Money::new(Decimal::new(minor, STORAGE_DP));
            let rounded = money.round_to_cents();

            prop_assert_eq!(rounded.round_to_cents(), rounded);
            prop_assert!((rounded - money).abs().amount() <= dec!(0.005));
        }

        #[test]
        fn checked_add_agrees_with_operator(
            a in -1_000_000i64..1_000_000i64,
            b in -1_000_000i64..1_000_000i64,
        ) {
            let (ma, mb) = (Money::from_minor(a), Money::from_minor(b));
            prop_assert_eq!(ma.checked_add(&mb), Ok(ma + mb));
            prop_assert_eq!(ma.checked_sub(&mb), Ok(ma - mb));
        }
    }
}
