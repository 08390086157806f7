//! Risk events
//!
//! Produced whenever a gate denies an event, a transaction scores as high
//! risk, or a gate fails for operational reasons. Append-only analytics
//! records; the admission logic never reads them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stash_core::{FraudRisk, TransactionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    /// A gate denied the event on a business rule
    GateDenied,
    /// A gate could not decide (policy lookup failure, timeout) and failed closed
    OperationalError,
    /// The risk scorer flagged a committed transaction
    HighRisk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: String,
    pub user_id: UserId,
    pub kind: RiskEventKind,
    /// Machine-readable deny reason, for gate events
    pub reason: Option<String>,
    /// Risk score, for high-risk events
    pub score: Option<u8>,
    #[serde(default)]
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

impl RiskEvent {
    fn new(user_id: UserId, kind: RiskEventKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            kind,
            reason: None,
            score: None,
            metadata: Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// A business-rule denial from `gate`
    pub fn gate_denied(user_id: UserId, gate: &str, reason: &str, summary: &str) -> Self {
        let mut event = Self::new(user_id, RiskEventKind::GateDenied);
        event.reason = Some(reason.to_string());
        event.metadata = serde_json::json!({ "gate": gate, "summary": summary });
        event
    }

    /// A fail-closed denial caused by an infrastructure problem in `gate`
    pub fn operational_error(user_id: UserId, gate: &str, reason: &str, error: &str) -> Self {
        let mut event = Self::new(user_id, RiskEventKind::OperationalError);
        event.reason = Some(reason.to_string());
        event.metadata = serde_json::json!({ "gate": gate, "error": error });
        event
    }

    /// A committed transaction scored above the high-risk threshold
    pub fn high_risk(user_id: UserId, transaction_id: TransactionId, risk: &FraudRisk) -> Self {
        let mut event = Self::new(user_id, RiskEventKind::HighRisk);
        event.score = Some(risk.risk_score);
        event.metadata = serde_json::json!({
            "transaction_id": transaction_id.to_string(),
            "flags": risk.flags,
        });
        event
    }
}
