//! Amount - Non-negative integer amount in currency minor units
//!
//! All money in Stash is counted in minor units (cents, pence, ...) so that
//! allocation arithmetic never drifts. Negative amounts are rejected at the
//! type level; signed gaps (shortfall/surplus) are computed on `i64`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when working with amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(i64),

    #[error("Amount overflow")]
    Overflow,
}

/// A non-negative amount of money in minor units.
///
/// # Invariant
/// The inner value is always >= 0. This is enforced by the constructor.
///
/// # Example
/// ```
/// use stash_core::Amount;
///
/// let amount = Amount::new(10_050).unwrap();
/// assert_eq!(amount.minor_units(), 10_050);
///
/// // Negative amounts are rejected
/// assert!(Amount::new(-1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    /// Zero amount constant
    pub const ZERO: Self = Self(0);

    /// Create a new Amount from minor units.
    ///
    /// Returns an error if the value is negative.
    pub fn new(minor_units: i64) -> Result<Self, AmountError> {
        if minor_units < 0 {
            Err(AmountError::NegativeAmount(minor_units))
        } else {
            Ok(Self(minor_units))
        }
    }

    /// Create an Amount without validation.
    ///
    /// The caller MUST ensure the value is non-negative.
    #[inline]
    pub const fn new_unchecked(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Get the value in minor units
    #[inline]
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition - returns None on overflow
    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction - returns None if the result would be negative
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        let result = self.0.checked_sub(other.0)?;
        if result < 0 {
            None
        } else {
            Some(Amount(result))
        }
    }

    /// Subtraction clamped at zero
    pub fn saturating_sub(&self, other: &Amount) -> Amount {
        Amount((self.0 - other.0).max(0))
    }

    /// Sum an iterator of amounts, failing on overflow
    pub fn checked_sum<'a>(amounts: impl IntoIterator<Item = &'a Amount>) -> Result<Amount, AmountError> {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, a| acc.checked_add(a).ok_or(AmountError::Overflow))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(100).unwrap();
        assert_eq!(amount.minor_units(), 100);
    }

    #[test]
    fn test_amount_zero() {
        let amount = Amount::new(0).unwrap();
        assert!(amount.is_zero());
    }

    #[test]
    fn test_amount_negative_rejected() {
        let result = Amount::new(-100);
        assert!(matches!(result, Err(AmountError::NegativeAmount(-100))));
    }

    #[test]
    fn test_checked_sub_prevents_negative() {
        let a = Amount::new(50).unwrap();
        let b = Amount::new(100).unwrap();
        assert!(a.checked_sub(&b).is_none());
        assert_eq!(a.saturating_sub(&b), Amount::ZERO);
    }

    #[test]
    fn test_checked_sum_overflow() {
        let big = [Amount::new_unchecked(i64::MAX), Amount::new_unchecked(1)];
        assert_eq!(Amount::checked_sum(&big), Err(AmountError::Overflow));
    }

    #[test]
    fn test_deserialize_rejects_negative() {
        let parsed: Result<Amount, _> = serde_json::from_str("-5");
        assert!(parsed.is_err());
        let parsed: Amount = serde_json::from_str("1234").unwrap();
        assert_eq!(parsed.minor_units(), 1234);
    }
}
