//! Allocation arithmetic and envelope status
//!
//! Pure functions, no locking. The ledger applies their results under the
//! account locks.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use stash_core::{AccountId, AccountStatus, AllocationLine, Amount};

use crate::error::{LedgerError, LedgerResult};

/// Check that every percentage lies in `0..=100` and that they sum to 100
/// within `tolerance`. Returns the sum.
pub fn validate_percentages(percentages: &[Decimal], tolerance: Decimal) -> LedgerResult<Decimal> {
    if percentages.is_empty() {
        return Err(LedgerError::InvalidPercentages("no accounts".to_string()));
    }

    let hundred = Decimal::ONE_HUNDRED;
    if let Some(bad) = percentages.iter().find(|p| **p < Decimal::ZERO || **p > hundred) {
        return Err(LedgerError::InvalidPercentages(format!("{} is outside 0..=100", bad)));
    }

    let total: Decimal = percentages.iter().sum();
    if (total - hundred).abs() > tolerance {
        return Err(LedgerError::InvalidPercentages(format!(
            "sum is {}, expected 100 ± {}",
            total, tolerance
        )));
    }
    Ok(total)
}

/// Split `income` across `shares` (already in canonical order).
///
/// Each line is `floor(income * percentage / total)`; the rounding remainder
/// goes to the first line so that the lines sum to `income` exactly. With
/// percentages summing to exactly 100 this is `floor(income * pct / 100)`.
pub fn split(income: Amount, shares: &[(AccountId, Decimal)], total: Decimal) -> LedgerResult<Vec<AllocationLine>> {
    if shares.is_empty() || total <= Decimal::ZERO {
        return Err(LedgerError::InvalidPercentages("nothing to allocate to".to_string()));
    }

    let income_dec = Decimal::from(income.minor_units());
    let mut lines = Vec::with_capacity(shares.len());
    let mut allocated: i64 = 0;

    for (account_id, percentage) in shares {
        let share = (income_dec * *percentage / total)
            .floor()
            .to_i64()
            .ok_or(LedgerError::Overflow)?;
        allocated = allocated.checked_add(share).ok_or(LedgerError::Overflow)?;
        lines.push(AllocationLine {
            account_id: *account_id,
            amount: Amount::new(share)?,
        });
    }

    let remainder = income.minor_units() - allocated;
    if remainder < 0 {
        return Err(LedgerError::InvalidPercentages(format!(
            "shares exceed income by {}",
            -remainder
        )));
    }
    if let Some(holder) = lines.first_mut() {
        holder.amount = Amount::new(holder.amount.minor_units() + remainder)?;
    }

    Ok(lines)
}

/// Gap between a balance and its proportional target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gap {
    Shortfall(Amount),
    Surplus(Amount),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusAssessment {
    pub status: AccountStatus,
    /// Proportional target to date
    pub expected: Amount,
    pub gap: Option<Gap>,
}

/// Derive an envelope's status.
///
/// The target is expected to be reached linearly over `horizon` allocation
/// cycles: `expected = target * min(cycles, horizon) / horizon`. A balance
/// within `band_pct` percent of `expected` is green, below is red, above is
/// blue. Envelopes without a target are always green, and so are envelopes
/// at 0%: they take no share of income, so no progress is expected of them.
pub fn assess(
    balance: Amount,
    target: Amount,
    percentage: Decimal,
    cycles: u32,
    horizon: u32,
    band_pct: u32,
) -> StatusAssessment {
    if target.is_zero() || percentage.is_zero() {
        return StatusAssessment {
            status: AccountStatus::Green,
            expected: Amount::ZERO,
            gap: None,
        };
    }

    let horizon = horizon.max(1) as i128;
    let elapsed = (cycles as i128).min(horizon);
    let expected = (target.minor_units() as i128 * elapsed / horizon) as i64;
    let band = (expected as i128 * band_pct as i128 / 100) as i64;
    let balance_units = balance.minor_units();
    let expected_amount = Amount::new_unchecked(expected);

    if balance_units < expected - band {
        StatusAssessment {
            status: AccountStatus::Red,
            expected: expected_amount,
            gap: Some(Gap::Shortfall(Amount::new_unchecked(expected - balance_units))),
        }
    } else if balance_units > expected + band {
        StatusAssessment {
            status: AccountStatus::Blue,
            expected: expected_amount,
            gap: Some(Gap::Surplus(Amount::new_unchecked(balance_units - expected))),
        }
    } else {
        StatusAssessment {
            status: AccountStatus::Green,
            expected: expected_amount,
            gap: None,
        }
    }
}
