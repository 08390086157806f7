//! Lending capacity preview
//!
//! Greedy draw over the lender's eligible envelopes. Advisory only: the
//! same planner runs again under the account locks when a loan is approved.

use serde::{Deserialize, Serialize};
use stash_core::{Amount, EnvelopeAccount};
use stash_ledger::DrawLine;

use crate::config::LendingConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityPreview {
    pub principal: Amount,
    pub can_approve: bool,
    /// What the eligible envelopes can cover, at most `principal`
    pub allowed_amount: Amount,
    pub shortfall: Amount,
    pub draw_plan: Vec<DrawLine>,
}

/// An envelope may fund a loan when it is active, of a lendable type and
/// not restricted to external payout.
pub fn is_eligible(account: &EnvelopeAccount, config: &LendingConfig) -> bool {
    account.active && !account.external_payout_only && config.is_lendable(account.account_type)
}

/// Draw `principal` from `accounts` in priority order, each up to its balance
pub fn plan_draws(accounts: &[EnvelopeAccount], principal: Amount, config: &LendingConfig) -> CapacityPreview {
    let mut eligible: Vec<&EnvelopeAccount> = accounts
        .iter()
        .filter(|a| is_eligible(a, config) && !a.balance.is_zero())
        .collect();
    eligible.sort_by_key(|a| (config.rank(a.account_type), a.account_type, a.created_at, a.id));

    let mut remaining = principal.minor_units();
    let mut draw_plan = Vec::new();
    for account in eligible {
        if remaining == 0 {
            break;
        }
        let take = account.balance.minor_units().min(remaining);
        draw_plan.push(DrawLine {
            account_id: account.id,
            amount: Amount::new_unchecked(take),
        });
        remaining -= take;
    }

    CapacityPreview {
        principal,
        can_approve: remaining == 0,
        allowed_amount: Amount::new_unchecked(principal.minor_units() - remaining),
        shortfall: Amount::new_unchecked(remaining),
        draw_plan,
    }
}
