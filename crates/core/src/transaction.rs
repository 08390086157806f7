//! Transactions and money-movement events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::amount::Amount;
use crate::ids::{AccountId, IdempotencyKey, TransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
    Income,
    Expense,
    /// Move between two envelopes of the same user
    Transfer,
}

/// Where a transaction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionOrigin {
    External,
    PeerTransfer,
    LoanDisbursement,
    LoanRepayment,
    Rebalance,
}

/// Direction of money relative to the actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Kind of inbound money-movement event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Income,
    Expense,
    PeerTransfer,
    LoanDisbursement,
    LoanRepayment,
}

impl EventKind {
    /// Directions this kind of event may legally declare
    pub fn allows(&self, direction: Direction) -> bool {
        match self {
            EventKind::Income => direction == Direction::Incoming,
            EventKind::Expense => direction == Direction::Outgoing,
            EventKind::PeerTransfer | EventKind::LoanDisbursement | EventKind::LoanRepayment => true,
        }
    }
}

/// One line of an income allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub account_id: AccountId,
    pub amount: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskFlag {
    AmountSpike,
    HighFrequency,
    NewLocation,
    OddHour,
    NewCategory,
}

/// Advisory risk snapshot attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudRisk {
    /// 0..=100
    pub risk_score: u8,
    pub is_high_risk: bool,
    pub flags: Vec<RiskFlag>,
}

impl FraudRisk {
    pub fn none() -> Self {
        Self {
            risk_score: 0,
            is_high_risk: false,
            flags: Vec::new(),
        }
    }
}

/// Immutable record of money movement
///
/// Only `description` and `category` may be corrected after commit, and
/// `fraud_risk` attached once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub txn_type: TransactionType,
    pub origin: TransactionOrigin,
    pub amount: Amount,
    pub date: DateTime<Utc>,
    /// Envelope debited or credited; `None` for allocated income
    pub account_id: Option<AccountId>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub fraud_risk: Option<FraudRisk>,
    pub allocations: Vec<AllocationLine>,
    /// The other leg of a peer transfer / loan movement
    pub counterpart: Option<TransactionId>,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl Transaction {
    pub fn new(user_id: UserId, txn_type: TransactionType, origin: TransactionOrigin, amount: Amount) -> Self {
        Self {
            id: TransactionId::new(),
            user_id,
            txn_type,
            origin,
            amount,
            date: Utc::now(),
            account_id: None,
            category: None,
            description: None,
            location: None,
            fraud_risk: None,
            allocations: Vec::new(),
            counterpart: None,
            idempotency_key: None,
        }
    }

    pub fn on_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_idempotency_key(mut self, key: Option<IdempotencyKey>) -> Self {
        self.idempotency_key = key;
        self
    }

    /// Signed effect on the owner's total funds
    pub fn net_effect(&self) -> i64 {
        match self.txn_type {
            TransactionType::Income => self.amount.minor_units(),
            TransactionType::Expense => -self.amount.minor_units(),
            TransactionType::Transfer => 0,
        }
    }
}
