//! Request details and receipts of ledger operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_core::{AccountId, AllocationLine, Amount, IdempotencyKey, Transaction};

/// Descriptive fields shared by every money movement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDetails {
    pub category: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Defaults to the commit time
    pub date: Option<DateTime<Utc>>,
    /// Replays with the same key and request return the first receipt
    pub idempotency_key: Option<IdempotencyKey>,
}

impl EntryDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(IdempotencyKey::new(key));
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub(crate) fn stamp(&self, txn: Transaction) -> Transaction {
        txn.at(self.date.unwrap_or_else(Utc::now))
            .with_category(self.category.clone())
            .with_description(self.description.clone())
            .with_location(self.location.clone())
            .with_idempotency_key(self.idempotency_key.clone())
    }
}

/// One source of a multi-account draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawLine {
    pub account_id: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeReceipt {
    pub transaction: Transaction,
}

impl IncomeReceipt {
    pub fn allocations(&self) -> &[AllocationLine] {
        &self.transaction.allocations
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseReceipt {
    pub transaction: Transaction,
}

/// The two linked legs of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub sender: Transaction,
    pub recipient: Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementReceipt {
    /// One debit per source account
    pub lender: Vec<Transaction>,
    pub borrower: Transaction,
}

/// Stored result of an idempotent operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Receipt {
    Income(IncomeReceipt),
    Expense(ExpenseReceipt),
    Transfer(TransferReceipt),
    Disbursement(DisbursementReceipt),
}
