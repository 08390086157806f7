//! Seed data: users and their envelopes
//!
//! Storage is in memory, so the CLI rebuilds its world from a seed file
//! before replaying events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stash_core::{AccountType, Amount, EnvelopeAccount, KycTier, Limitation, LimitationState, User, UserId};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    pub id: UserId,
    #[serde(default)]
    pub kyc_tier: KycTier,
    pub country: String,
    #[serde(default)]
    pub limitation: Option<LimitationState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeSeed {
    pub owner: UserId,
    pub account_type: AccountType,
    pub percentage: Decimal,
    #[serde(default)]
    pub target: Amount,
    #[serde(default)]
    pub external_payout_only: bool,
}

impl EnvelopeSeed {
    pub fn to_account(&self) -> EnvelopeAccount {
        EnvelopeAccount::new(self.owner.clone(), self.account_type, self.percentage, self.target)
            .with_external_payout_only(self.external_payout_only)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<UserSeed>,
    #[serde(default)]
    pub envelopes: Vec<EnvelopeSeed>,
}

impl Seed {
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl UserSeed {
    pub fn to_user(&self) -> User {
        User::new(self.id.clone(), self.kyc_tier, self.country.clone())
    }

    /// Limitation record to apply after registration, if any
    pub fn limitation_record(&self, now: chrono::DateTime<chrono::Utc>) -> Option<Limitation> {
        match self.limitation {
            None | Some(LimitationState::None) => None,
            Some(state) => Some(Limitation::new(self.id.clone(), state, "seeded", "seed", now)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        let json = r#"{
            "users": [
                {"id": "alice", "kyc_tier": "tier1", "country": "us"},
                {"id": "bob", "country": "US", "limitation": "temporary_30"}
            ],
            "envelopes": [
                {"owner": "alice", "account_type": "daily", "percentage": "60"},
                {"owner": "alice", "account_type": "fun", "percentage": "40", "target": 5000}
            ]
        }"#;
        let seed: Seed = serde_json::from_str(json).unwrap();

        assert_eq!(seed.users[0].to_user().country, "US");
        assert_eq!(seed.users[1].kyc_tier, KycTier::Tier0);
        assert!(seed.users[0].limitation_record(chrono::Utc::now()).is_none());
        let record = seed.users[1].limitation_record(chrono::Utc::now()).unwrap();
        assert!(record.expires_at.is_some());

        let fun = seed.envelopes[1].to_account();
        assert_eq!(fun.target, Amount::new(5_000).unwrap());
        assert_eq!(fun.account_type, AccountType::Fun);
    }
}
