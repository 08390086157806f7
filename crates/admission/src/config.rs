//! Admission configuration

use serde::{Deserialize, Serialize};
use stash_core::KycTier;

/// Policy when a gate cannot reach a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailPolicy {
    /// Deny the event
    #[default]
    FailClosed,

    /// Accepted in config files for compatibility. Admission always fails
    /// closed; this value is ignored with a warning.
    FailOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Budget for a single gate, including its policy lookups
    #[serde(default = "default_gate_timeout_ms")]
    pub gate_timeout_ms: u64,

    #[serde(default)]
    pub fail_policy: FailPolicy,

    /// Tier assumed for actors registered without one
    #[serde(default)]
    pub default_tier: KycTier,
}

fn default_gate_timeout_ms() -> u64 {
    500
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            gate_timeout_ms: default_gate_timeout_ms(),
            fail_policy: FailPolicy::default(),
            default_tier: KycTier::default(),
        }
    }
}

impl AdmissionConfig {
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AdmissionConfig::default();
        assert_eq!(config.gate_timeout_ms, 500);
        assert_eq!(config.fail_policy, FailPolicy::FailClosed);
        assert_eq!(config.default_tier, KycTier::Tier0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AdmissionConfig = serde_json::from_str(r#"{"fail_policy": "fail_open"}"#).unwrap();
        assert_eq!(config.gate_timeout_ms, 500);
        assert_eq!(config.fail_policy, FailPolicy::FailOpen);
    }
}
