//! Application configuration

use serde::{Deserialize, Serialize};
use stash_admission::AdmissionConfig;
use stash_ledger::LedgerConfig;
use stash_lending::LendingConfig;
use stash_risk::RiskConfig;
use std::path::{Path, PathBuf};

/// Path of a JSON config file
pub const CONFIG_ENV: &str = "STASH_CONFIG";
/// Overrides `data_dir`
pub const DATA_DIR_ENV: &str = "STASH_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Risk event log, relative to `data_dir`
    #[serde(default = "default_risk_log_file")]
    pub risk_log_file: String,

    /// Policy bundle (JSON). Without one every country is blocked.
    #[serde(default)]
    pub policy_file: Option<PathBuf>,

    #[serde(default)]
    pub admission: AdmissionConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub lending: LendingConfig,

    /// How long an accepted keyed submission is replayable (seconds)
    #[serde(default = "default_submission_ttl_secs")]
    pub submission_ttl_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_risk_log_file() -> String {
    "risk_events.jsonl".to_string()
}

fn default_submission_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            risk_log_file: default_risk_log_file(),
            policy_file: None,
            admission: AdmissionConfig::default(),
            ledger: LedgerConfig::default(),
            risk: RiskConfig::default(),
            lending: LendingConfig::default(),
            submission_ttl_secs: default_submission_ttl_secs(),
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// File named by `STASH_CONFIG` (defaults otherwise), then the
    /// `STASH_DATA_DIR` override
    pub fn from_env() -> Result<Self, std::io::Error> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn risk_log_path(&self) -> PathBuf {
        self.data_dir.join(&self.risk_log_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_admission::FailPolicy;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.risk_log_path(), PathBuf::from("./data/risk_events.jsonl"));
        assert_eq!(config.admission.fail_policy, FailPolicy::FailClosed);
        assert_eq!(config.ledger.lock_timeout_ms, 1_000);
    }

    #[test]
    fn test_nested_sections_are_optional() {
        let json = r#"{
            "data_dir": "/var/lib/stash",
            "ledger": { "on_target_band_pct": 10 },
            "risk": { "high_risk_threshold": 50 }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/stash"));
        assert_eq!(config.ledger.on_target_band_pct, 10);
        assert_eq!(config.ledger.target_horizon_cycles, 12);
        assert_eq!(config.risk.high_risk_threshold, 50);
        assert_eq!(config.risk.trailing_days, 7);
        assert_eq!(config.admission.gate_timeout_ms, 500);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stash.json");
        std::fs::write(&path, r#"{"risk_log_file": "events.jsonl"}"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.risk_log_file, "events.jsonl");
        assert!(config.policy_file.is_none());
    }
}
