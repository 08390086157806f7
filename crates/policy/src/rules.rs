//! Declarative policy records
//!
//! Every record is versioned independently. A new version applies to all
//! later admission checks and never to transactions already decided.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_core::{Amount, KycTier};
use std::collections::BTreeSet;

/// A policy value plus its version stamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn initial(value: T) -> Self {
        Self {
            version: 1,
            updated_by: "bootstrap".to_string(),
            updated_at: Utc::now(),
            value,
        }
    }

    /// Next version carrying `value`
    pub fn next(&self, value: T, updated_by: impl Into<String>) -> Self {
        Self {
            version: self.version + 1,
            updated_by: updated_by.into(),
            updated_at: Utc::now(),
            value,
        }
    }
}

/// Geo gate mode. Only allowlisting exists: unlisted countries are blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoMode {
    #[default]
    Allowlist,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoPolicy {
    #[serde(default)]
    pub mode: GeoMode,
    /// ISO 3166-1 alpha-2 codes, uppercase
    #[serde(default)]
    pub countries: BTreeSet<String>,
}

impl GeoPolicy {
    pub fn allowlist<'a>(countries: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            mode: GeoMode::Allowlist,
            countries: countries.into_iter().map(|c| c.trim().to_uppercase()).collect(),
        }
    }

    pub fn allows(&self, country: &str) -> bool {
        match self.mode {
            GeoMode::Allowlist => self.countries.contains(&country.trim().to_uppercase()),
        }
    }
}

/// Client signals presented with a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSignals {
    #[serde(default)]
    pub cookies_enabled: bool,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub javascript_enabled: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl DeviceSignals {
    /// Signals of an ordinary interactive browser
    pub fn browser() -> Self {
        Self {
            cookies_enabled: true,
            headless: false,
            javascript_enabled: true,
            user_agent: Some("Mozilla/5.0".to_string()),
            fingerprint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSignal {
    CookiesEnabled,
    NotHeadless,
    JavascriptEnabled,
    UserAgentPresent,
    FingerprintPresent,
}

impl DeviceSignal {
    pub fn is_satisfied_by(&self, signals: &DeviceSignals) -> bool {
        match self {
            DeviceSignal::CookiesEnabled => signals.cookies_enabled,
            DeviceSignal::NotHeadless => !signals.headless,
            DeviceSignal::JavascriptEnabled => signals.javascript_enabled,
            DeviceSignal::UserAgentPresent => signals.user_agent.as_deref().is_some_and(|ua| !ua.trim().is_empty()),
            DeviceSignal::FingerprintPresent => signals.fingerprint.as_deref().is_some_and(|fp| !fp.trim().is_empty()),
        }
    }
}

/// Device gate rule: at least `min_signals` of `signals` must hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRule {
    pub signals: Vec<DeviceSignal>,
    pub min_signals: usize,
}

impl Default for DeviceRule {
    fn default() -> Self {
        Self {
            signals: vec![DeviceSignal::CookiesEnabled, DeviceSignal::NotHeadless],
            min_signals: 2,
        }
    }
}

impl DeviceRule {
    pub fn satisfied_count(&self, signals: &DeviceSignals) -> usize {
        self.signals.iter().filter(|s| s.is_satisfied_by(signals)).count()
    }

    pub fn admits(&self, signals: &DeviceSignals) -> bool {
        self.satisfied_count(signals) >= self.min_signals
    }
}

/// Caps and velocity ceilings for a KYC tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitTier {
    pub tier: KycTier,
    pub daily_limit: Amount,
    pub monthly_limit: Amount,
    pub daily_tx_count: u32,
    pub weekly_tx_count: u32,
    pub monthly_tx_count: u32,
}

impl LimitTier {
    /// Conservative defaults per tier
    pub fn default_for(tier: KycTier) -> Self {
        match tier {
            KycTier::Tier0 => Self {
                tier,
                daily_limit: Amount::new_unchecked(10_000),
                monthly_limit: Amount::new_unchecked(100_000),
                daily_tx_count: 5,
                weekly_tx_count: 20,
                monthly_tx_count: 60,
            },
            KycTier::Tier1 => Self {
                tier,
                daily_limit: Amount::new_unchecked(50_000),
                monthly_limit: Amount::new_unchecked(500_000),
                daily_tx_count: 20,
                weekly_tx_count: 100,
                monthly_tx_count: 300,
            },
            KycTier::Tier2 => Self {
                tier,
                daily_limit: Amount::new_unchecked(500_000),
                monthly_limit: Amount::new_unchecked(5_000_000),
                daily_tx_count: 100,
                weekly_tx_count: 500,
                monthly_tx_count: 1_500,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_allowlist_blocks_unlisted() {
        let policy = GeoPolicy::allowlist(["us", "CA"]);
        assert!(policy.allows("US"));
        assert!(policy.allows("ca"));
        assert!(!policy.allows("FR"));
    }

    #[test]
    fn test_empty_geo_policy_blocks_everyone() {
        assert!(!GeoPolicy::default().allows("US"));
    }

    #[test]
    fn test_geo_mode_rejects_denylist_json() {
        let parsed = serde_json::from_str::<GeoPolicy>(r#"{ "mode": "denylist", "countries": [] }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_device_rule_default() {
        let rule = DeviceRule::default();
        assert!(rule.admits(&DeviceSignals::browser()));

        let headless = DeviceSignals {
            headless: true,
            ..DeviceSignals::browser()
        };
        assert_eq!(rule.satisfied_count(&headless), 1);
        assert!(!rule.admits(&headless));
    }

    #[test]
    fn test_device_rule_threshold() {
        let rule = DeviceRule {
            signals: vec![
                DeviceSignal::CookiesEnabled,
                DeviceSignal::JavascriptEnabled,
                DeviceSignal::FingerprintPresent,
            ],
            min_signals: 2,
        };
        let signals = DeviceSignals {
            cookies_enabled: true,
            fingerprint: Some("abc".to_string()),
            ..Default::default()
        };
        assert!(rule.admits(&signals));
    }

    #[test]
    fn test_versioned_next() {
        let v1 = Versioned::initial(GeoPolicy::allowlist(["US"]));
        let v2 = v1.next(GeoPolicy::allowlist(["US", "GB"]), "ADMIN-1");
        assert_eq!(v2.version, 2);
        assert_eq!(v2.updated_by, "ADMIN-1");
    }

    #[test]
    fn test_tier_defaults() {
        let tier1 = LimitTier::default_for(KycTier::Tier1);
        assert_eq!(tier1.daily_limit.minor_units(), 50_000);
        assert!(LimitTier::default_for(KycTier::Tier0).daily_limit < tier1.daily_limit);
    }
}
