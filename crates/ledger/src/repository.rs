//! Repositories for transactions and envelope debt/surplus logs
//!
//! Explicit interfaces, constructed once at start-up and injected into the
//! ledger. The in-memory implementations back tests and the CLI.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_core::{AccountId, DebtLog, FraudRisk, SurplusLog, Transaction, TransactionId, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{LedgerError, LedgerResult};

/// Non-financial fields that may be corrected after commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataCorrection {
    pub description: Option<String>,
    pub category: Option<String>,
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persist a unit of work. Either every transaction is stored or none.
    async fn insert_all(&self, transactions: Vec<Transaction>) -> LedgerResult<()>;

    async fn get(&self, id: &TransactionId) -> LedgerResult<Transaction>;

    /// Transactions of `user` dated at or after `since`, oldest first
    async fn list_for_user(&self, user: &UserId, since: Option<DateTime<Utc>>) -> LedgerResult<Vec<Transaction>>;

    /// Change description/category. Amount and allocations are immutable.
    async fn correct_metadata(&self, id: &TransactionId, correction: MetadataCorrection) -> LedgerResult<Transaction>;

    /// Store the risk snapshot computed for a transaction
    async fn attach_risk(&self, id: &TransactionId, risk: FraudRisk) -> LedgerResult<()>;
}

#[derive(Default)]
struct TransactionState {
    by_id: HashMap<TransactionId, Transaction>,
    by_user: HashMap<UserId, Vec<TransactionId>>,
}

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    state: RwLock<TransactionState>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert_all(&self, transactions: Vec<Transaction>) -> LedgerResult<()> {
        let mut state = self.state.write().await;
        if let Some(dup) = transactions.iter().find(|t| state.by_id.contains_key(&t.id)) {
            return Err(LedgerError::Storage(format!("duplicate transaction id {}", dup.id)));
        }
        for txn in transactions {
            state.by_user.entry(txn.user_id.clone()).or_default().push(txn.id);
            state.by_id.insert(txn.id, txn);
        }
        Ok(())
    }

    async fn get(&self, id: &TransactionId) -> LedgerResult<Transaction> {
        self.state
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or(LedgerError::TransactionNotFound(*id))
    }

    async fn list_for_user(&self, user: &UserId, since: Option<DateTime<Utc>>) -> LedgerResult<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut txns: Vec<Transaction> = state
            .by_user
            .get(user)
            .into_iter()
            .flatten()
            .filter_map(|id| state.by_id.get(id))
            .filter(|t| since.map_or(true, |s| t.date >= s))
            .cloned()
            .collect();
        txns.sort_by_key(|t| t.date);
        Ok(txns)
    }

    async fn correct_metadata(&self, id: &TransactionId, correction: MetadataCorrection) -> LedgerResult<Transaction> {
        let mut state = self.state.write().await;
        let txn = state.by_id.get_mut(id).ok_or(LedgerError::TransactionNotFound(*id))?;
        if correction.description.is_some() {
            txn.description = correction.description;
        }
        if correction.category.is_some() {
            txn.category = correction.category;
        }
        tracing::info!(transaction_id = %id, "Transaction metadata corrected");
        Ok(txn.clone())
    }

    async fn attach_risk(&self, id: &TransactionId, risk: FraudRisk) -> LedgerResult<()> {
        let mut state = self.state.write().await;
        let txn = state.by_id.get_mut(id).ok_or(LedgerError::TransactionNotFound(*id))?;
        txn.fraud_risk = Some(risk);
        Ok(())
    }
}

/// Append-only debt and surplus logs per account
#[async_trait]
pub trait EnvelopeLogRepository: Send + Sync {
    async fn append_debt(&self, log: DebtLog) -> LedgerResult<()>;

    async fn append_surplus(&self, log: SurplusLog) -> LedgerResult<()>;

    async fn debt_logs(&self, account: &AccountId) -> LedgerResult<Vec<DebtLog>>;

    async fn surplus_logs(&self, account: &AccountId) -> LedgerResult<Vec<SurplusLog>>;
}

#[derive(Default)]
pub struct InMemoryEnvelopeLogRepository {
    debt: RwLock<HashMap<AccountId, Vec<DebtLog>>>,
    surplus: RwLock<HashMap<AccountId, Vec<SurplusLog>>>,
}

impl InMemoryEnvelopeLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnvelopeLogRepository for InMemoryEnvelopeLogRepository {
    async fn append_debt(&self, log: DebtLog) -> LedgerResult<()> {
        self.debt.write().await.entry(log.account_id).or_default().push(log);
        Ok(())
    }

    async fn append_surplus(&self, log: SurplusLog) -> LedgerResult<()> {
        self.surplus.write().await.entry(log.account_id).or_default().push(log);
        Ok(())
    }

    async fn debt_logs(&self, account: &AccountId) -> LedgerResult<Vec<DebtLog>> {
        Ok(self.debt.read().await.get(account).cloned().unwrap_or_default())
    }

    async fn surplus_logs(&self, account: &AccountId) -> LedgerResult<Vec<SurplusLog>> {
        Ok(self.surplus.read().await.get(account).cloned().unwrap_or_default())
    }
}
