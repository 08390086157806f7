//! Envelope accounts
//!
//! An envelope is a named sub-balance of a user's funds with an allocation
//! percentage and a savings target. Balances are only written by the ledger's
//! atomic protocols.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::amount::Amount;
use crate::ids::{AccountId, TransactionId, UserId};

/// Envelope type
///
/// Declaration order is the canonical order used for allocation remainders.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountType {
    Daily,
    Emergency,
    Investment,
    LongTerm,
    Fun,
}

/// Envelope status relative to its proportional target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountStatus {
    /// Shortfall
    Red,
    /// On target
    Green,
    /// Surplus
    Blue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeAccount {
    pub id: AccountId,
    pub owner: UserId,
    pub account_type: AccountType,
    /// Share of incoming allocations, 0..=100
    pub percentage: Decimal,
    pub balance: Amount,
    /// Savings goal, zero when the envelope has no goal
    pub target: Amount,
    pub status: AccountStatus,
    /// Number of allocations this envelope has taken part in
    pub allocation_cycles: u32,
    pub active: bool,
    /// Funds may only leave through external payout (never lendable)
    pub external_payout_only: bool,
    pub created_at: DateTime<Utc>,
}

impl EnvelopeAccount {
    pub fn new(owner: UserId, account_type: AccountType, percentage: Decimal, target: Amount) -> Self {
        Self {
            id: AccountId::new(),
            owner,
            account_type,
            percentage,
            balance: Amount::ZERO,
            target,
            status: AccountStatus::Green,
            allocation_cycles: 0,
            active: true,
            external_payout_only: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_external_payout_only(mut self, flag: bool) -> Self {
        self.external_payout_only = flag;
        self
    }
}

/// Append-only record of a shortfall found at allocation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtLog {
    pub account_id: AccountId,
    pub transaction_id: TransactionId,
    pub shortfall: Amount,
    pub balance: Amount,
    pub expected: Amount,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only record of a surplus found at allocation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurplusLog {
    pub account_id: AccountId,
    pub transaction_id: TransactionId,
    pub surplus: Amount,
    pub balance: Amount,
    pub expected: Amount,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use strum::IntoEnumIterator;

    #[test]
    fn test_canonical_order() {
        let order: Vec<_> = AccountType::iter().collect();
        assert_eq!(order.first(), Some(&AccountType::Daily));
        assert!(AccountType::Daily < AccountType::Fun);
    }

    #[test]
    fn test_account_type_parse() {
        assert_eq!("long_term".parse::<AccountType>().unwrap(), AccountType::LongTerm);
        assert_eq!(AccountType::Emergency.to_string(), "emergency");
    }

    #[test]
    fn test_new_account_starts_empty() {
        let account = EnvelopeAccount::new(UserId::new("alice"), AccountType::Fun, dec!(10), Amount::ZERO);
        assert!(account.balance.is_zero());
        assert!(account.active);
        assert!(!account.external_payout_only);
    }
}
