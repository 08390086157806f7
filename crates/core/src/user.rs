//! Users and their compliance attributes

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::ids::UserId;

/// KYC tier, selects the user's caps and velocity ceilings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KycTier {
    Tier0,
    Tier1,
    Tier2,
}

impl Default for KycTier {
    fn default() -> Self {
        KycTier::Tier0
    }
}

/// Limitation placed on a user by a reviewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LimitationState {
    None,
    #[serde(rename = "temporary_30")]
    #[strum(serialize = "temporary_30")]
    Temporary30,
    #[serde(rename = "temporary_180")]
    #[strum(serialize = "temporary_180")]
    Temporary180,
    Permanent,
}

impl Default for LimitationState {
    fn default() -> Self {
        LimitationState::None
    }
}

impl LimitationState {
    /// How long a limitation of this kind lasts; `None` for open-ended states
    pub fn duration(&self) -> Option<Duration> {
        match self {
            LimitationState::Temporary30 => Some(Duration::days(30)),
            LimitationState::Temporary180 => Some(Duration::days(180)),
            LimitationState::None | LimitationState::Permanent => None,
        }
    }
}

/// A user of the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub kyc_tier: KycTier,
    pub limitation_state: LimitationState,
    /// Set for temporary limitations
    pub limitation_expires_at: Option<DateTime<Utc>>,
    /// ISO 3166-1 alpha-2, uppercase
    pub country: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<UserId>, kyc_tier: KycTier, country: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kyc_tier,
            limitation_state: LimitationState::None,
            limitation_expires_at: None,
            country: country.into().trim().to_uppercase(),
            created_at: Utc::now(),
        }
    }

    /// Whether a limitation is in force at `now`.
    ///
    /// An expired temporary limitation counts as lifted even if the expiry
    /// sweep has not run yet.
    pub fn is_limited_at(&self, now: DateTime<Utc>) -> bool {
        match self.limitation_state {
            LimitationState::None => false,
            LimitationState::Permanent => true,
            LimitationState::Temporary30 | LimitationState::Temporary180 => {
                self.limitation_expires_at.map_or(true, |expires| now < expires)
            }
        }
    }
}

/// Immutable history record of a limitation decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limitation {
    pub id: String,
    pub user_id: UserId,
    pub state: LimitationState,
    pub reason: String,
    pub imposed_by: String,
    pub imposed_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Limitation {
    pub fn new(
        user_id: UserId,
        state: LimitationState,
        reason: impl Into<String>,
        imposed_by: impl Into<String>,
        imposed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            state,
            reason: reason.into(),
            imposed_by: imposed_by.into(),
            imposed_at,
            expires_at: state.duration().map(|d| imposed_at + d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_unlimited() {
        let user = User::new("alice", KycTier::Tier1, "us");
        assert_eq!(user.country, "US");
        assert!(!user.is_limited_at(Utc::now()));
    }

    #[test]
    fn test_temporary_limitation_expires() {
        let now = Utc::now();
        let mut user = User::new("bob", KycTier::Tier1, "US");
        user.limitation_state = LimitationState::Temporary30;
        user.limitation_expires_at = Some(now + Duration::days(30));

        assert!(user.is_limited_at(now));
        assert!(!user.is_limited_at(now + Duration::days(31)));
    }

    #[test]
    fn test_permanent_never_expires() {
        let mut user = User::new("carol", KycTier::Tier2, "DE");
        user.limitation_state = LimitationState::Permanent;
        assert!(user.is_limited_at(Utc::now() + Duration::days(10_000)));
    }

    #[test]
    fn test_limitation_record_expiry() {
        let now = Utc::now();
        let record = Limitation::new(UserId::new("bob"), LimitationState::Temporary180, "chargeback", "REVIEWER-1", now);
        assert_eq!(record.expires_at, Some(now + Duration::days(180)));
    }

    #[test]
    fn test_limitation_state_serialization() {
        let json = serde_json::to_string(&LimitationState::Temporary30).unwrap();
        assert_eq!(json, "\"temporary_30\"");
        assert_eq!("temporary_180".parse::<LimitationState>().unwrap(), LimitationState::Temporary180);
    }
}
