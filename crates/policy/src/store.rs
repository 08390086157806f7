//! Policy store
//!
//! The ledger core only reads policy. Writes come from the external
//! administration collaborator through the `set_*` methods, each producing a
//! new version.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stash_core::KycTier;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

use crate::error::{PolicyError, PolicyResult};
use crate::network::IpDenylist;
use crate::rules::{DeviceRule, GeoPolicy, LimitTier, Versioned};

/// Read access to the current compliance policy
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn geo_policy(&self) -> PolicyResult<Versioned<GeoPolicy>>;

    async fn ip_denylist(&self) -> PolicyResult<Versioned<IpDenylist>>;

    async fn device_rule(&self) -> PolicyResult<Versioned<DeviceRule>>;

    async fn limit_tier(&self, tier: KycTier) -> PolicyResult<Versioned<LimitTier>>;
}

/// Serializable policy bundle used to seed a store from a file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySnapshot {
    #[serde(default)]
    pub geo: GeoPolicy,
    #[serde(default)]
    pub ip_denylist: IpDenylist,
    #[serde(default)]
    pub device: DeviceRule,
    /// Missing tiers fall back to [`LimitTier::default_for`]
    #[serde(default)]
    pub tiers: Vec<LimitTier>,
}

impl PolicySnapshot {
    /// Load a policy bundle from a JSON file
    pub fn from_file(path: &Path) -> PolicyResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Self = serde_json::from_str(&content)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> PolicyResult<()> {
        if self.device.min_signals > self.device.signals.len() {
            return Err(PolicyError::InvalidPolicy(format!(
                "device rule needs {} signals but lists only {}",
                self.device.min_signals,
                self.device.signals.len()
            )));
        }
        for tier in &self.tiers {
            if tier.daily_limit > tier.monthly_limit {
                return Err(PolicyError::InvalidPolicy(format!(
                    "{}: daily limit exceeds monthly limit",
                    tier.tier
                )));
            }
        }
        Ok(())
    }
}

/// In-memory policy store
pub struct InMemoryPolicyStore {
    geo: RwLock<Versioned<GeoPolicy>>,
    ip: RwLock<Versioned<IpDenylist>>,
    device: RwLock<Versioned<DeviceRule>>,
    tiers: RwLock<HashMap<KycTier, Versioned<LimitTier>>>,
}

impl InMemoryPolicyStore {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        let mut tiers: HashMap<KycTier, Versioned<LimitTier>> = [KycTier::Tier0, KycTier::Tier1, KycTier::Tier2]
            .into_iter()
            .map(|tier| (tier, Versioned::initial(LimitTier::default_for(tier))))
            .collect();
        for tier in snapshot.tiers {
            tiers.insert(tier.tier, Versioned::initial(tier));
        }

        Self {
            geo: RwLock::new(Versioned::initial(snapshot.geo)),
            ip: RwLock::new(Versioned::initial(snapshot.ip_denylist)),
            device: RwLock::new(Versioned::initial(snapshot.device)),
            tiers: RwLock::new(tiers),
        }
    }

    pub async fn set_geo_policy(&self, policy: GeoPolicy, updated_by: &str) -> u64 {
        let mut current = self.geo.write().await;
        *current = current.next(policy, updated_by);
        tracing::info!(version = current.version, updated_by, "Geo policy updated");
        current.version
    }

    pub async fn set_ip_denylist(&self, denylist: IpDenylist, updated_by: &str) -> u64 {
        let mut current = self.ip.write().await;
        *current = current.next(denylist, updated_by);
        tracing::info!(version = current.version, updated_by, "IP denylist updated");
        current.version
    }

    pub async fn set_device_rule(&self, rule: DeviceRule, updated_by: &str) -> u64 {
        let mut current = self.device.write().await;
        *current = current.next(rule, updated_by);
        tracing::info!(version = current.version, updated_by, "Device rule updated");
        current.version
    }

    pub async fn set_limit_tier(&self, tier: LimitTier, updated_by: &str) -> u64 {
        let mut tiers = self.tiers.write().await;
        let key = tier.tier;
        let next = match tiers.get(&key) {
            Some(current) => current.next(tier, updated_by),
            None => Versioned::initial(tier),
        };
        let version = next.version;
        tiers.insert(key, next);
        tracing::info!(tier = %key, version, updated_by, "Limit tier updated");
        version
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn geo_policy(&self) -> PolicyResult<Versioned<GeoPolicy>> {
        Ok(self.geo.read().await.clone())
    }

    async fn ip_denylist(&self) -> PolicyResult<Versioned<IpDenylist>> {
        Ok(self.ip.read().await.clone())
    }

    async fn device_rule(&self) -> PolicyResult<Versioned<DeviceRule>> {
        Ok(self.device.read().await.clone())
    }

    async fn limit_tier(&self, tier: KycTier) -> PolicyResult<Versioned<LimitTier>> {
        self.tiers
            .read()
            .await
            .get(&tier)
            .cloned()
            .ok_or(PolicyError::TierNotConfigured(tier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_defaults_cover_every_tier() {
        let store = InMemoryPolicyStore::new(PolicySnapshot::default());
        for tier in [KycTier::Tier0, KycTier::Tier1, KycTier::Tier2] {
            let limits = store.limit_tier(tier).await.unwrap();
            assert_eq!(limits.value.tier, tier);
        }
    }

    #[tokio::test]
    async fn test_updates_bump_version() {
        let store = InMemoryPolicyStore::new(PolicySnapshot::default());
        assert_eq!(store.geo_policy().await.unwrap().version, 1);

        let version = store.set_geo_policy(GeoPolicy::allowlist(["US"]), "ADMIN-1").await;
        assert_eq!(version, 2);

        let current = store.geo_policy().await.unwrap();
        assert!(current.value.allows("US"));
        assert_eq!(current.updated_by, "ADMIN-1");
    }

    #[tokio::test]
    async fn test_snapshot_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "geo": {{ "countries": ["US", "GB"] }},
                "ip_denylist": {{ "ranges": ["10.0.0.0/8"] }},
                "tiers": [{{
                    "tier": "tier1", "daily_limit": 1000, "monthly_limit": 5000,
                    "daily_tx_count": 3, "weekly_tx_count": 10, "monthly_tx_count": 30
                }}]
            }}"#
        )
        .unwrap();

        let snapshot = PolicySnapshot::from_file(file.path()).unwrap();
        let store = InMemoryPolicyStore::new(snapshot);

        assert!(store.geo_policy().await.unwrap().value.allows("GB"));
        let tier1 = store.limit_tier(KycTier::Tier1).await.unwrap();
        assert_eq!(tier1.value.daily_limit.minor_units(), 1000);
        // untouched tiers keep their defaults
        let tier2 = store.limit_tier(KycTier::Tier2).await.unwrap();
        assert_eq!(tier2.value, LimitTier::default_for(KycTier::Tier2));
    }

    #[test]
    fn test_snapshot_rejects_inconsistent_tier() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "tiers": [{{
                "tier": "tier0", "daily_limit": 9000, "monthly_limit": 10,
                "daily_tx_count": 1, "weekly_tx_count": 1, "monthly_tx_count": 1
            }}] }}"#
        )
        .unwrap();

        assert!(matches!(
            PolicySnapshot::from_file(file.path()),
            Err(PolicyError::InvalidPolicy(_))
        ));
    }
}
