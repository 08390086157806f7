//! Read-only views of a user's envelopes

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stash_core::{AccountId, AccountStatus, AccountType, Amount, EnvelopeAccount, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: AccountId,
    pub account_type: AccountType,
    pub balance: Amount,
    pub target: Amount,
    pub status: AccountStatus,
    pub percentage: Decimal,
    pub active: bool,
    pub external_payout_only: bool,
}

impl From<&EnvelopeAccount> for AccountView {
    fn from(account: &EnvelopeAccount) -> Self {
        Self {
            id: account.id,
            account_type: account.account_type,
            balance: account.balance,
            target: account.target,
            status: account.status,
            percentage: account.percentage,
            active: account.active,
            external_payout_only: account.external_payout_only,
        }
    }
}

/// Allocation query result, accounts in canonical order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSnapshot {
    pub user_id: UserId,
    pub accounts: Vec<AccountView>,
    pub total_balance: Amount,
}

/// Result of a conservation check for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub user_id: UserId,
    /// Sum of all envelope balances
    pub balance_total: i64,
    /// Net of all committed transactions
    pub transaction_total: i64,
    pub consistent: bool,
}
