//! Amortization engine
//!
//! Pure functions turning principal, annual rate and term into an equal
//! monthly installment. Nothing here fails: out-of-range input yields a zero
//! installment and the underwriting service rejects such loans upstream.

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::Money;

/// Installment and interest for a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub monthly_payment: Money,
    pub total_interest: Money,
}

impl ScheduleSummary {
    pub const ZERO: ScheduleSummary = ScheduleSummary {
        monthly_payment: Money::ZERO,
        total_interest: Money::ZERO,
    };
}

/// One row of a repayment table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub payment_number: u32,
    pub due_date: NaiveDate,
    pub payment: Money,
    pub principal: Money,
    pub interest: Money,
    /// Principal still outstanding after this payment
    pub remaining: Money,
}

fn monthly_rate(annual_rate_percent: Decimal) -> Decimal {
    annual_rate_percent / dec!(100) / dec!(12)
}

/// `(1 + r)^n` by repeated multiplication; `None` on overflow
fn compound(rate: Decimal, months: u32) -> Option<Decimal> {
    let base = Decimal::ONE.checked_add(rate)?;
    (0..months).try_fold(Decimal::ONE, |factor, _| factor.checked_mul(base))
}

/// Monthly installment and total interest
///
/// With a positive rate the standard annuity formula is used:
///
/// ```text
/// payment = P * r * (1 + r)^n / ((1 + r)^n - 1),   r = annual% / 100 / 12
/// ```
///
/// A zero or negative rate divides the principal evenly. Both figures are
/// rounded half-up to cents; `total_interest = payment * n - P`. Figures too
/// large to represent yield [`ScheduleSummary::ZERO`].
pub fn compute_schedule(principal: Money, annual_rate_percent: Decimal, term_months: u32) -> ScheduleSummary {
    if !principal.is_positive() || term_months == 0 {
        return ScheduleSummary::ZERO;
    }
    installment(principal, annual_rate_percent, term_months).unwrap_or(ScheduleSummary::ZERO)
}

fn installment(principal: Money, annual_rate_percent: Decimal, term_months: u32) -> Option<ScheduleSummary> {
    let months = Decimal::from(term_months);
    let even_split = || principal.divide(months).ok();

    let payment = if annual_rate_percent <= Decimal::ZERO {
        even_split()?
    } else {
        let r = monthly_rate(annual_rate_percent);
        let factor = compound(r, term_months)?;
        let denominator = factor - Decimal::ONE;
        if denominator.is_zero() {
            even_split()?
        } else {
            let ratio = r.checked_mul(factor)?.checked_div(denominator)?;
            principal.checked_mul(ratio).ok()?
        }
    }
    .round_to_cents();

    let total_interest = payment
        .checked_mul(months)
        .and_then(|total| total.checked_sub(&principal))
        .ok()?
        .round_to_cents();
    Some(ScheduleSummary {
        monthly_payment: payment,
        total_interest,
    })
}

/// Outstanding amount, never negative
pub fn remaining_balance(principal: Money, total_interest: Money, total_repaid: Money) -> Money {
    (principal + total_interest - total_repaid).floor_at_zero()
}

/// Month-by-month table starting one month after `start`
///
/// Interest for each month is charged on the principal still outstanding;
/// the final row clears whatever principal is left so rounding never leaves
/// a residue.
pub fn repayment_table(
    principal: Money,
    annual_rate_percent: Decimal,
    term_months: u32,
    start: NaiveDate,
) -> Vec<ScheduleEntry> {
    let summary = compute_schedule(principal, annual_rate_percent, term_months);
    if summary.monthly_payment.is_zero() {
        return Vec::new();
    }

    let r = if annual_rate_percent > Decimal::ZERO {
        monthly_rate(annual_rate_percent)
    } else {
        Decimal::ZERO
    };

    let mut outstanding = principal;
    let mut rows = Vec::with_capacity(term_months as usize);
    for number in 1..=term_months {
        let interest = (outstanding * r).round_to_cents();
        let last = number == term_months;
        let principal_part = if last {
            outstanding
        } else {
            (summary.monthly_payment - interest).min(outstanding)
        };
        outstanding -= principal_part;

        rows.push(ScheduleEntry {
            payment_number: number,
            due_date: add_months(start, number),
            payment: principal_part + interest,
            principal: principal_part,
            interest,
            remaining: outstanding,
        });
    }
    rows
}

/// Calendar month arithmetic, clamping to the last day of shorter months
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(NaiveDate::MAX)
}
