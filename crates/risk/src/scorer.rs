//! Risk scorer
//!
//! Deterministic weighted heuristic over the user's trailing history.
//! Advisory only: the score is stored with the transaction and never
//! blocks it.

use chrono::{Duration, Timelike};
use stash_core::{FraudRisk, RiskFlag, Transaction, UserId};
use stash_ledger::TransactionRepository;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::RiskConfig;
use crate::error::RiskResult;

pub struct RiskScorer {
    transactions: Arc<dyn TransactionRepository>,
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new(transactions: Arc<dyn TransactionRepository>, config: RiskConfig) -> Self {
        Self { transactions, config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Score `txn` against `user`'s transactions from the trailing window
    /// strictly before it. Anything dated at or after `txn`, including the
    /// committed copy of `txn` itself, is left out.
    pub async fn score(&self, user: &UserId, txn: &Transaction) -> RiskResult<FraudRisk> {
        let since = txn.date - Duration::days(self.config.trailing_days);
        let history: Vec<Transaction> = self
            .transactions
            .list_for_user(user, Some(since))
            .await?
            .into_iter()
            .filter(|t| t.id != txn.id && t.date < txn.date)
            .collect();

        let risk = score_against(&self.config, &history, txn);
        if risk.is_high_risk {
            tracing::warn!(
                user_id = %user,
                transaction_id = %txn.id,
                score = risk.risk_score,
                flags = ?risk.flags,
                "High-risk transaction"
            );
        } else {
            tracing::debug!(user_id = %user, score = risk.risk_score, "Transaction scored");
        }
        Ok(risk)
    }
}

/// Score a transaction against an already selected trailing window
pub fn score_against(config: &RiskConfig, trailing: &[Transaction], txn: &Transaction) -> FraudRisk {
    let weights = &config.weights;
    let mut score: u32 = 0;
    let mut flags = Vec::new();

    // Amount spike: amount > multiplier * average, i.e. amount * n > multiplier * sum
    if !trailing.is_empty() {
        let sum: i128 = trailing.iter().map(|t| t.amount.minor_units() as i128).sum();
        let n = trailing.len() as i128;
        if txn.amount.minor_units() as i128 * n > weights.spike_multiplier as i128 * sum {
            score += weights.amount_spike;
            flags.push(RiskFlag::AmountSpike);
        }
    }

    let count = trailing.len() as u32;
    if count > weights.frequency_threshold {
        let points = (count - weights.frequency_threshold).saturating_mul(weights.frequency_step);
        score += points.min(weights.frequency_cap);
        flags.push(RiskFlag::HighFrequency);
    }

    if let Some(location) = txn.location.as_deref() {
        let known: HashSet<&str> = trailing.iter().filter_map(|t| t.location.as_deref()).collect();
        if !known.is_empty() && !known.contains(location) {
            score += weights.new_location;
            flags.push(RiskFlag::NewLocation);
        }
    }

    let hour = txn.date.hour();
    if hour >= config.odd_hour_start || hour < config.odd_hour_end {
        score += weights.odd_hour;
        flags.push(RiskFlag::OddHour);
    }

    if let Some(category) = txn.category.as_deref() {
        let seen = trailing.iter().any(|t| t.category.as_deref() == Some(category));
        if !seen {
            score += weights.new_category;
            flags.push(RiskFlag::NewCategory);
        }
    }

    let risk_score = score.min(100) as u8;
    FraudRisk {
        risk_score,
        is_high_risk: risk_score > config.high_risk_threshold,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use stash_core::{Amount, TransactionOrigin, TransactionType};
    use stash_ledger::InMemoryTransactionRepository;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap()
    }

    fn txn(amount: i64, date: DateTime<Utc>) -> Transaction {
        Transaction::new(
            UserId::new("alice"),
            TransactionType::Expense,
            TransactionOrigin::External,
            Amount::new(amount).unwrap(),
        )
        .at(date)
    }

    fn history(n: usize, amount: i64) -> Vec<Transaction> {
        (0..n)
            .map(|i| {
                txn(amount, noon() - Duration::hours(i as i64 + 1))
                    .with_category(Some("groceries".into()))
                    .with_location(Some("Austin".into()))
            })
            .collect()
    }

    #[test]
    fn test_quiet_transaction_scores_zero() {
        let config = RiskConfig::default();
        let candidate = txn(100, noon())
            .with_category(Some("groceries".into()))
            .with_location(Some("Austin".into()));

        let risk = score_against(&config, &history(5, 100), &candidate);
        assert_eq!(risk.risk_score, 0);
        assert!(!risk.is_high_risk);
        assert!(risk.flags.is_empty());
    }

    #[test]
    fn test_amount_spike_is_strictly_greater() {
        let config = RiskConfig::default();
        let trailing = history(4, 100);

        let at_limit = score_against(&config, &trailing, &txn(500, noon()));
        assert!(!at_limit.flags.contains(&RiskFlag::AmountSpike));

        let above = score_against(&config, &trailing, &txn(501, noon()));
        assert!(above.flags.contains(&RiskFlag::AmountSpike));
        assert_eq!(above.risk_score, 30);
    }

    #[test]
    fn test_frequency_points_are_capped() {
        let config = RiskConfig::default();

        let busy = score_against(&config, &history(25, 100), &txn(100, noon()));
        assert_eq!(busy.risk_score, 10);

        let frantic = score_against(&config, &history(60, 100), &txn(100, noon()));
        assert_eq!(frantic.risk_score, 30);
        assert!(frantic.flags.contains(&RiskFlag::HighFrequency));
    }

    #[test]
    fn test_odd_hours() {
        let config = RiskConfig::default();
        let late = Utc.with_ymd_and_hms(2024, 3, 14, 23, 30, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 3, 14, 4, 59, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2024, 3, 14, 5, 0, 0).unwrap();

        assert_eq!(score_against(&config, &[], &txn(1, late)).risk_score, 15);
        assert_eq!(score_against(&config, &[], &txn(1, early)).risk_score, 15);
        assert_eq!(score_against(&config, &[], &txn(1, morning)).risk_score, 0);
    }

    #[test]
    fn test_new_location_needs_history_new_category_does_not() {
        let config = RiskConfig::default();
        let candidate = txn(100, noon())
            .with_category(Some("jewelry".into()))
            .with_location(Some("Lagos".into()));

        let first = score_against(&config, &[], &candidate);
        assert_eq!(first.risk_score, 15);
        assert_eq!(first.flags, vec![RiskFlag::NewCategory]);

        let risk = score_against(&config, &history(3, 100), &candidate);
        assert_eq!(risk.risk_score, 35);
        assert!(risk.flags.contains(&RiskFlag::NewLocation));
        assert!(risk.flags.contains(&RiskFlag::NewCategory));
    }

    #[test]
    fn test_everything_at_once_is_high_risk() {
        let config = RiskConfig::default();
        let late = Utc.with_ymd_and_hms(2024, 3, 14, 23, 30, 0).unwrap();
        let candidate = txn(1_000_000, late)
            .with_category(Some("jewelry".into()))
            .with_location(Some("Lagos".into()));

        let risk = score_against(&config, &history(40, 100), &candidate);
        // 30 + 30 + 20 + 15 + 15 = 110, clamped
        assert_eq!(risk.risk_score, 100);
        assert!(risk.is_high_risk);
    }

    #[tokio::test]
    async fn test_score_reads_trailing_window_only() {
        let repo = Arc::new(InMemoryTransactionRepository::new());
        let old: Vec<Transaction> = (0..30).map(|_| txn(100, noon() - Duration::days(10))).collect();
        repo.insert_all(old).await.unwrap();
        let candidate = txn(100, noon());
        repo.insert_all(vec![candidate.clone()]).await.unwrap();

        let scorer = RiskScorer::new(repo, RiskConfig::default());
        let risk = scorer.score(&UserId::new("alice"), &candidate).await.unwrap();
        assert_eq!(risk.risk_score, 0);
    }
}
