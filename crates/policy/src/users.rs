//! User directory: compliance attributes and limitation history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stash_core::{Limitation, LimitationState, User, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{PolicyError, PolicyResult};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get(&self, id: &UserId) -> PolicyResult<User>;

    /// Register a user (or replace its non-limitation attributes)
    async fn register(&self, user: User) -> PolicyResult<()>;

    /// Impose or lift a limitation. The record is appended to history and the
    /// user's current state follows it.
    async fn apply_limitation(&self, record: Limitation) -> PolicyResult<User>;

    async fn limitation_history(&self, id: &UserId) -> PolicyResult<Vec<Limitation>>;

    /// Clear temporary limitations that expired before `now`.
    /// Returns the users that were released.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> PolicyResult<Vec<UserId>>;
}

#[derive(Default)]
struct DirectoryState {
    users: HashMap<UserId, User>,
    history: HashMap<UserId, Vec<Limitation>>,
}

/// In-memory user directory
#[derive(Default)]
pub struct InMemoryUserDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get(&self, id: &UserId) -> PolicyResult<User> {
        self.state
            .read()
            .await
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| PolicyError::UserNotFound(id.to_string()))
    }

    async fn register(&self, user: User) -> PolicyResult<()> {
        let mut state = self.state.write().await;
        match state.users.get_mut(&user.id) {
            Some(existing) => {
                existing.kyc_tier = user.kyc_tier;
                existing.country = user.country;
            }
            None => {
                tracing::info!(user_id = %user.id, tier = %user.kyc_tier, "User registered");
                state.users.insert(user.id.clone(), user);
            }
        }
        Ok(())
    }

    async fn apply_limitation(&self, record: Limitation) -> PolicyResult<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&record.user_id)
            .ok_or_else(|| PolicyError::UserNotFound(record.user_id.to_string()))?;

        user.limitation_state = record.state;
        user.limitation_expires_at = record.expires_at;
        let updated = user.clone();

        tracing::warn!(
            user_id = %record.user_id,
            state = %record.state,
            imposed_by = %record.imposed_by,
            "Limitation state changed"
        );
        state.history.entry(record.user_id.clone()).or_default().push(record);

        Ok(updated)
    }

    async fn limitation_history(&self, id: &UserId) -> PolicyResult<Vec<Limitation>> {
        Ok(self.state.read().await.history.get(id).cloned().unwrap_or_default())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> PolicyResult<Vec<UserId>> {
        let mut state = self.state.write().await;
        let mut released = Vec::new();

        for user in state.users.values_mut() {
            let expired = user.limitation_state.duration().is_some()
                && user.limitation_expires_at.is_some_and(|expires| expires <= now);
            if expired {
                user.limitation_state = LimitationState::None;
                user.limitation_expires_at = None;
                released.push(user.id.clone());
            }
        }

        for id in &released {
            let record = Limitation::new(id.clone(), LimitationState::None, "limitation expired", "expiry-sweep", now);
            state.history.entry(id.clone()).or_default().push(record);
        }

        if !released.is_empty() {
            tracing::info!(count = released.len(), "Expired limitations swept");
        }
        Ok(released)
    }
}
