//! Admission decisions

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Machine-readable reason for a denial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DenyReason {
    GeoBlocked,
    IpBlocked,
    DeviceBlocked,
    LimitationBlocked,
    CapExceeded,
    VelocityExceeded,
}

impl DenyReason {
    pub fn code(&self) -> &str {
        self.as_ref()
    }
}

/// Outcome of a single gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Deny { reason: DenyReason, summary: String },
}

impl GateDecision {
    pub fn deny(reason: DenyReason, summary: impl Into<String>) -> Self {
        GateDecision::Deny {
            reason,
            summary: summary.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, GateDecision::Pass)
    }
}

/// A denial as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub reason: DenyReason,
    /// Human-readable explanation
    pub summary: String,
    /// Gate that denied
    pub gate: String,
    /// True when the gate could not decide and the pipeline failed closed
    #[serde(default)]
    pub fail_closed: bool,
}

/// Final pipeline decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Decision::Allow => None,
            Decision::Deny(denial) => Some(denial),
        }
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        self.denial().map(|d| d.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_reason_codes() {
        assert_eq!(DenyReason::GeoBlocked.code(), "geo_blocked");
        assert_eq!(DenyReason::IpBlocked.code(), "ip_blocked");
        assert_eq!(DenyReason::DeviceBlocked.code(), "device_blocked");
        assert_eq!(DenyReason::LimitationBlocked.code(), "limitation_blocked");
        assert_eq!(DenyReason::CapExceeded.code(), "cap_exceeded");
        assert_eq!(DenyReason::VelocityExceeded.code(), "velocity_exceeded");
    }

    #[test]
    fn test_decision_serialization() {
        let decision = Decision::Deny(Denial {
            reason: DenyReason::CapExceeded,
            summary: "daily cap reached".into(),
            gate: "caps".into(),
            fail_closed: false,
        });
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"decision\":\"deny\""));
        assert!(json.contains("\"reason\":\"cap_exceeded\""));
        assert_eq!(decision.deny_reason(), Some(DenyReason::CapExceeded));
        assert!(!decision.is_allowed());
    }
}
