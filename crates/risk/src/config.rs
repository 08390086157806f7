//! Risk scorer configuration

use serde::{Deserialize, Serialize};

/// Points added by each rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    #[serde(default = "default_amount_spike")]
    pub amount_spike: u32,
    /// Amount above this multiple of the trailing average is a spike
    #[serde(default = "default_spike_multiplier")]
    pub spike_multiplier: u32,
    /// Trailing count above which frequency points start
    #[serde(default = "default_frequency_threshold")]
    pub frequency_threshold: u32,
    #[serde(default = "default_frequency_step")]
    pub frequency_step: u32,
    #[serde(default = "default_frequency_cap")]
    pub frequency_cap: u32,
    #[serde(default = "default_new_location")]
    pub new_location: u32,
    #[serde(default = "default_odd_hour")]
    pub odd_hour: u32,
    #[serde(default = "default_new_category")]
    pub new_category: u32,
}

fn default_amount_spike() -> u32 {
    30
}
fn default_spike_multiplier() -> u32 {
    5
}
fn default_frequency_threshold() -> u32 {
    20
}
fn default_frequency_step() -> u32 {
    2
}
fn default_frequency_cap() -> u32 {
    30
}
fn default_new_location() -> u32 {
    20
}
fn default_odd_hour() -> u32 {
    15
}
fn default_new_category() -> u32 {
    15
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            amount_spike: default_amount_spike(),
            spike_multiplier: default_spike_multiplier(),
            frequency_threshold: default_frequency_threshold(),
            frequency_step: default_frequency_step(),
            frequency_cap: default_frequency_cap(),
            new_location: default_new_location(),
            odd_hour: default_odd_hour(),
            new_category: default_new_category(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Length of the trailing history window
    #[serde(default = "default_trailing_days")]
    pub trailing_days: i64,

    /// Scores strictly above this are high risk
    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: u8,

    /// Odd hours are `[odd_hour_start, 24) ∪ [0, odd_hour_end)`, UTC
    #[serde(default = "default_odd_hour_start")]
    pub odd_hour_start: u32,

    #[serde(default = "default_odd_hour_end")]
    pub odd_hour_end: u32,

    #[serde(default)]
    pub weights: RiskWeights,
}

fn default_trailing_days() -> i64 {
    7
}
fn default_high_risk_threshold() -> u8 {
    70
}
fn default_odd_hour_start() -> u32 {
    23
}
fn default_odd_hour_end() -> u32 {
    5
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            trailing_days: default_trailing_days(),
            high_risk_threshold: default_high_risk_threshold(),
            odd_hour_start: default_odd_hour_start(),
            odd_hour_end: default_odd_hour_end(),
            weights: RiskWeights::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: RiskConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.trailing_days, 7);
        assert_eq!(config.high_risk_threshold, 70);
        assert_eq!(config.weights.amount_spike, 30);
        assert_eq!(config.weights.frequency_cap, 30);
    }
}
