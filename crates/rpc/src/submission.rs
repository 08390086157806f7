//! Inbound event submission
//!
//! An event passes the admission pipeline, is routed to the ledger by kind
//! and direction, and is scored for risk while the ledger commits. The
//! score is stored with the committed transaction and never changes the
//! outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_admission::{AdmissionContext, Decision, DenyReason};
use stash_core::{
    AccountId, AccountType, Amount, Direction, EventKind, FraudRisk, IdempotencyKey, Transaction, TransactionId,
    TransactionOrigin, TransactionType, User, UserId,
};
use stash_events::{RiskEvent, RiskEventSink};
use stash_ledger::{EntryDetails, LedgerError};
use stash_lending::LendingError;
use stash_policy::{DeviceSignals, PolicyError, UserDirectory};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::context::AppContext;

/// A money-movement event as submitted by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub actor_id: UserId,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub amount: Amount,
    pub direction: Direction,
    pub origin_ip: IpAddr,
    #[serde(default)]
    pub device_signals: DeviceSignals,
    /// Declared event time. Dates the transaction and anchors risk scoring;
    /// the receive time stands in when absent. Admission never reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Other party of a transfer or loan
    #[serde(default)]
    pub counterparty: Option<UserId>,
    /// Actor's envelope to use; daily when absent
    #[serde(default)]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl InboundEvent {
    pub fn new(actor_id: UserId, kind: EventKind, direction: Direction, amount: Amount, origin_ip: IpAddr) -> Self {
        Self {
            actor_id,
            kind,
            amount,
            direction,
            origin_ip,
            device_signals: DeviceSignals::browser(),
            timestamp: None,
            counterparty: None,
            account_type: None,
            idempotency_key: None,
            category: None,
            location: None,
            description: None,
        }
    }

    pub fn with_counterparty(mut self, counterparty: UserId) -> Self {
        self.counterparty = Some(counterparty);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    fn details(&self, received_at: DateTime<Utc>) -> EntryDetails {
        EntryDetails {
            category: self.category.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            date: Some(self.timestamp.unwrap_or(received_at)),
            // actors pick keys independently
            idempotency_key: self
                .idempotency_key
                .as_ref()
                .map(|k| IdempotencyKey::new(format!("{}:{}", self.actor_id, k))),
        }
    }

    /// The actor's side of the event, as scored before the commit lands
    fn candidate(&self, received_at: DateTime<Utc>) -> Transaction {
        let txn_type = match self.direction {
            Direction::Incoming => TransactionType::Income,
            Direction::Outgoing => TransactionType::Expense,
        };
        let origin = match self.kind {
            EventKind::Income | EventKind::Expense => TransactionOrigin::External,
            EventKind::PeerTransfer => TransactionOrigin::PeerTransfer,
            EventKind::LoanDisbursement => TransactionOrigin::LoanDisbursement,
            EventKind::LoanRepayment => TransactionOrigin::LoanRepayment,
        };
        Transaction::new(self.actor_id.clone(), txn_type, origin, self.amount)
            .at(self.timestamp.unwrap_or(received_at))
            .with_category(self.category.clone())
            .with_location(self.location.clone())
    }

    fn counterparty(&self) -> Result<&UserId, SubmitError> {
        self.counterparty
            .as_ref()
            .ok_or_else(|| SubmitError::InvalidEvent(format!("{} needs a counterparty", self.kind)))
    }

    /// The counterparty whose envelope an incoming peer event debits
    fn payer(&self) -> Result<Option<&UserId>, SubmitError> {
        match (self.kind, self.direction) {
            (EventKind::PeerTransfer | EventKind::LoanDisbursement | EventKind::LoanRepayment, Direction::Incoming) => {
                self.counterparty().map(Some)
            }
            _ => Ok(None),
        }
    }

    fn admission(&self, actor: User, direction: Direction, now: DateTime<Utc>) -> AdmissionContext {
        AdmissionContext::new(actor, self.kind, direction, self.amount)
            .with_origin_ip(self.origin_ip)
            .with_device_signals(self.device_signals.clone())
            .at(now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// The actor's transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
}

impl SubmissionOutcome {
    fn accepted(transaction_id: TransactionId) -> Self {
        Self {
            accepted: true,
            deny_reason: None,
            summary: None,
            transaction_id: Some(transaction_id),
        }
    }

    fn denied(reason: DenyReason, summary: String) -> Self {
        Self {
            accepted: false,
            deny_reason: Some(reason),
            summary: Some(summary),
            transaction_id: None,
        }
    }
}

/// Submission failures. A denial is not an error; every error here means
/// no funds moved.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Actor lookup failed: {0}")]
    Actor(#[from] PolicyError),

    #[error("User {0} has no active {1} envelope")]
    NoEnvelope(UserId, AccountType),

    #[error("Transaction failed, no funds moved: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Loan failed, no funds moved: {0}")]
    Lending(#[from] LendingError),

    #[error("Idempotency key {0} was already used for a different event")]
    KeyReused(String),
}

pub(crate) struct StoredSubmission {
    event: InboundEvent,
    outcome: SubmissionOutcome,
    stored_at: DateTime<Utc>,
}

pub(crate) type SubmissionSlot = Arc<Mutex<Option<StoredSubmission>>>;

/// Keyed by `(actor, idempotency key)`
pub(crate) type SubmissionSlots = HashMap<(UserId, String), SubmissionSlot>;

/// Drop accepted submissions older than `ttl`. Slots in use are kept.
fn prune(slots: &mut SubmissionSlots, now: DateTime<Utc>, ttl: chrono::Duration) {
    slots.retain(|_, slot| {
        if Arc::strong_count(slot) > 1 {
            return true;
        }
        match slot.try_lock() {
            Ok(stored) => stored.as_ref().is_some_and(|s| now - s.stored_at < ttl),
            Err(_) => true,
        }
    });
}

impl AppContext {
    /// Admit, apply and score one event.
    ///
    /// With an idempotency key, a replay of an accepted event by the same
    /// actor returns the first outcome without passing admission again.
    /// Keys are retained for `submission_ttl_secs`.
    pub async fn submit(&self, event: InboundEvent) -> Result<SubmissionOutcome, SubmitError> {
        let received_at = Utc::now();
        let Some(key) = event.idempotency_key.clone() else {
            return self.process(&event, received_at).await;
        };

        let scoped = (event.actor_id.clone(), key.clone());
        let slot = {
            let mut slots = self.submissions.lock().await;
            if !slots.contains_key(&scoped) {
                let ttl = chrono::Duration::seconds(self.config().submission_ttl_secs as i64);
                prune(&mut slots, received_at, ttl);
            }
            slots.entry(scoped).or_default().clone()
        };
        let mut slot = slot.lock_owned().await;
        if let Some(stored) = slot.as_ref() {
            if stored.event == event {
                tracing::info!(user_id = %event.actor_id, key = %key, "Replayed submission, returning first outcome");
                return Ok(stored.outcome.clone());
            }
            return Err(SubmitError::KeyReused(key));
        }

        let outcome = self.process(&event, received_at).await?;
        if outcome.accepted {
            *slot = Some(StoredSubmission {
                event,
                outcome: outcome.clone(),
                stored_at: Utc::now(),
            });
        }
        Ok(outcome)
    }

    /// Keyed submissions currently held for replay
    pub async fn retained_submissions(&self) -> usize {
        self.submissions.lock().await.len()
    }

    async fn process(&self, event: &InboundEvent, received_at: DateTime<Utc>) -> Result<SubmissionOutcome, SubmitError> {
        if !event.kind.allows(event.direction) {
            return Err(SubmitError::InvalidEvent(format!(
                "{} cannot be {}",
                event.kind, event.direction
            )));
        }
        if event.amount.is_zero() {
            return Err(SubmitError::InvalidEvent("amount must be positive".to_string()));
        }

        let actor = self.users.get(&event.actor_id).await?;
        let ctx = event.admission(actor, event.direction, received_at);
        if let Decision::Deny(denial) = self.pipeline.evaluate(&ctx).await {
            return Ok(SubmissionOutcome::denied(denial.reason, denial.summary));
        }

        // money leaving the counterparty passes its outgoing checks too
        if let Some(payer_id) = event.payer()? {
            let payer = self.users.get(payer_id).await?;
            let ctx = event.admission(payer, Direction::Outgoing, received_at);
            if let Decision::Deny(denial) = self.pipeline.evaluate(&ctx).await {
                return Ok(SubmissionOutcome::denied(
                    denial.reason,
                    format!("Counterparty {}: {}", payer_id, denial.summary),
                ));
            }
        }

        let candidate = event.candidate(received_at);
        let (committed, scored) = tokio::join!(
            self.apply(event, received_at),
            self.scorer.score(&event.actor_id, &candidate)
        );
        let transaction_id = committed?;

        match scored {
            Ok(risk) => self.annotate(&event.actor_id, transaction_id, risk).await,
            Err(e) => tracing::warn!(transaction_id = %transaction_id, error = %e, "Risk scoring failed"),
        }

        tracing::info!(
            user_id = %event.actor_id,
            kind = %event.kind,
            direction = %event.direction,
            amount = %event.amount,
            transaction_id = %transaction_id,
            "Event accepted"
        );
        Ok(SubmissionOutcome::accepted(transaction_id))
    }

    /// Route an admitted event to the ledger; returns the actor's transaction
    async fn apply(&self, event: &InboundEvent, received_at: DateTime<Utc>) -> Result<TransactionId, SubmitError> {
        let actor = &event.actor_id;
        let own_type = event.account_type.unwrap_or(AccountType::Daily);
        let details = event.details(received_at);

        let id = match (event.kind, event.direction) {
            (EventKind::Income, _) => {
                self.ledger
                    .record_income(actor, event.amount, details)
                    .await?
                    .transaction
                    .id
            }
            (EventKind::Expense, _) => {
                let account = self.envelope(actor, own_type).await?;
                self.ledger
                    .record_expense(account, event.amount, details)
                    .await?
                    .transaction
                    .id
            }
            (EventKind::PeerTransfer, Direction::Outgoing) => {
                let from = self.envelope(actor, own_type).await?;
                let to = self.envelope(event.counterparty()?, AccountType::Daily).await?;
                self.ledger.transfer(from, to, event.amount, details).await?.sender.id
            }
            (EventKind::PeerTransfer, Direction::Incoming) => {
                let from = self.envelope(event.counterparty()?, AccountType::Daily).await?;
                let to = self.envelope(actor, own_type).await?;
                self.ledger.transfer(from, to, event.amount, details).await?.recipient.id
            }
            (EventKind::LoanDisbursement, Direction::Outgoing) => {
                let to = self.loans.receiving_account(event.counterparty()?).await?;
                let receipt = self.loans.approve(actor, to, event.amount, details).await?;
                receipt.lender.first().map(|t| t.id).unwrap_or(receipt.borrower.id)
            }
            (EventKind::LoanDisbursement, Direction::Incoming) => {
                let to = self.loans.receiving_account(actor).await?;
                let receipt = self
                    .loans
                    .approve(event.counterparty()?, to, event.amount, details)
                    .await?;
                receipt.borrower.id
            }
            (EventKind::LoanRepayment, Direction::Outgoing) => {
                let from = self.envelope(actor, own_type).await?;
                let to = self.envelope(event.counterparty()?, AccountType::Daily).await?;
                self.loans.repay(from, to, event.amount, details).await?.sender.id
            }
            (EventKind::LoanRepayment, Direction::Incoming) => {
                let from = self.envelope(event.counterparty()?, AccountType::Daily).await?;
                let to = self.envelope(actor, own_type).await?;
                self.loans.repay(from, to, event.amount, details).await?.recipient.id
            }
        };
        Ok(id)
    }

    async fn envelope(&self, user: &UserId, account_type: AccountType) -> Result<AccountId, SubmitError> {
        self.ledger
            .find_account(user, account_type)
            .await?
            .map(|a| a.id)
            .ok_or_else(|| SubmitError::NoEnvelope(user.clone(), account_type))
    }

    /// Store the score with the transaction; raise a high-risk event
    async fn annotate(&self, user: &UserId, transaction_id: TransactionId, risk: FraudRisk) {
        if risk.is_high_risk {
            let event = RiskEvent::high_risk(user.clone(), transaction_id, &risk);
            if let Err(e) = self.risk_log.record(event).await {
                tracing::warn!(transaction_id = %transaction_id, error = %e, "Failed to record high-risk event");
            }
        }
        if let Err(e) = self.ledger.transactions().attach_risk(&transaction_id, risk).await {
            tracing::warn!(transaction_id = %transaction_id, error = %e, "Failed to attach risk score");
        }
    }
}
