//! Per-user windowed counters
//!
//! One counter row per `(user, window)`. A row whose `reset_at` has passed is
//! rolled over lazily on the next access: count and amount go back to zero and
//! the new boundary is `now + window duration`. Windows therefore slide from
//! the first use after expiry and are not aligned to calendar days or months.
//!
//! Every read or write of a row happens under that row's mutex, so a rollover
//! computes exactly one new boundary and check-then-increment cannot be
//! interleaved.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use stash_core::{Amount, UserId};
use std::sync::Arc;
use strum_macros::{Display, EnumIter};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{VelocityError, VelocityResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VelocityWindow {
    Day,
    Week,
    Month,
}

impl VelocityWindow {
    /// All windows in lock order
    pub const ALL: [VelocityWindow; 3] = [VelocityWindow::Day, VelocityWindow::Week, VelocityWindow::Month];

    pub fn duration(&self) -> Duration {
        match self {
            VelocityWindow::Day => Duration::days(1),
            VelocityWindow::Week => Duration::days(7),
            VelocityWindow::Month => Duration::days(30),
        }
    }
}

/// Counter row for one `(user, window)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityCounter {
    pub count: u32,
    pub amount: Amount,
    pub reset_at: DateTime<Utc>,
}

impl VelocityCounter {
    fn fresh(window: VelocityWindow, now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            amount: Amount::ZERO,
            reset_at: now + window.duration(),
        }
    }

    /// Lazy rollover. Returns true if the window was reset.
    fn roll_over(&mut self, window: VelocityWindow, now: DateTime<Utc>) -> bool {
        if now >= self.reset_at {
            *self = Self::fresh(window, now);
            true
        } else {
            false
        }
    }
}

/// Ceiling for one window. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub window: VelocityWindow,
    pub max_count: Option<u32>,
    pub max_amount: Option<Amount>,
}

impl WindowLimit {
    pub fn count(window: VelocityWindow, max_count: u32) -> Self {
        Self {
            window,
            max_count: Some(max_count),
            max_amount: None,
        }
    }

    pub fn amount(window: VelocityWindow, max_amount: Amount) -> Self {
        Self {
            window,
            max_count: None,
            max_amount: Some(max_amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VelocityOutcome {
    /// Counters were incremented
    Allowed,
    CountExceeded {
        window: VelocityWindow,
        count: u32,
        limit: u32,
    },
    AmountExceeded {
        window: VelocityWindow,
        used: Amount,
        requested: Amount,
        limit: Amount,
    },
}

impl VelocityOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, VelocityOutcome::Allowed)
    }
}

/// Usage of a single window, as seen at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUsage {
    pub window: VelocityWindow,
    pub count: u32,
    pub amount: Amount,
    pub reset_at: DateTime<Utc>,
}

type CounterKey = (UserId, VelocityWindow);

/// Velocity tracker shared by the caps and velocity gates
#[derive(Debug, Default)]
pub struct VelocityTracker {
    rows: DashMap<CounterKey, Arc<Mutex<VelocityCounter>>>,
}

impl VelocityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_row(&self, user: &UserId, window: VelocityWindow, now: DateTime<Utc>) -> OwnedMutexGuard<VelocityCounter> {
        // Clone the Arc out so the map shard is released before awaiting.
        let row = self
            .rows
            .entry((user.clone(), window))
            .or_insert_with(|| Arc::new(Mutex::new(VelocityCounter::fresh(window, now))))
            .clone();
        row.lock_owned().await
    }

    /// Current usage of `window` for `user`, rolling the row over if expired
    pub async fn usage_at(&self, user: &UserId, window: VelocityWindow, now: DateTime<Utc>) -> WindowUsage {
        let mut row = self.lock_row(user, window, now).await;
        if row.roll_over(window, now) {
            tracing::debug!(user_id = %user, window = %window, reset_at = %row.reset_at, "Velocity window rolled over");
        }
        WindowUsage {
            window,
            count: row.count,
            amount: row.amount,
            reset_at: row.reset_at,
        }
    }

    pub async fn usage(&self, user: &UserId, window: VelocityWindow) -> WindowUsage {
        self.usage_at(user, window, Utc::now()).await
    }

    /// Check every limit and, only if all pass, count the event in every window.
    ///
    /// All rows of the user are held for the duration of the call, locked in
    /// [`VelocityWindow::ALL`] order.
    pub async fn check_and_increment_at(
        &self,
        user: &UserId,
        amount: Amount,
        limits: &[WindowLimit],
        now: DateTime<Utc>,
    ) -> VelocityResult<VelocityOutcome> {
        let mut guards = Vec::with_capacity(VelocityWindow::ALL.len());
        for window in VelocityWindow::ALL {
            let mut row = self.lock_row(user, window, now).await;
            row.roll_over(window, now);
            guards.push((window, row));
        }

        for limit in limits {
            let Some((_, row)) = guards.iter().find(|(w, _)| *w == limit.window) else {
                continue;
            };

            if let Some(max_count) = limit.max_count {
                if row.count >= max_count {
                    return Ok(VelocityOutcome::CountExceeded {
                        window: limit.window,
                        count: row.count,
                        limit: max_count,
                    });
                }
            }

            if let Some(max_amount) = limit.max_amount {
                let projected = row.amount.checked_add(&amount).ok_or(VelocityError::Overflow)?;
                if projected > max_amount {
                    return Ok(VelocityOutcome::AmountExceeded {
                        window: limit.window,
                        used: row.amount,
                        requested: amount,
                        limit: max_amount,
                    });
                }
            }
        }

        // All checks passed. Compute every new value before writing any.
        let mut updated = Vec::with_capacity(guards.len());
        for (_, row) in &guards {
            let new_amount = row.amount.checked_add(&amount).ok_or(VelocityError::Overflow)?;
            let new_count = row.count.checked_add(1).ok_or(VelocityError::Overflow)?;
            updated.push((new_count, new_amount));
        }
        for ((_, row), (count, total)) in guards.iter_mut().zip(updated) {
            row.count = count;
            row.amount = total;
        }

        tracing::debug!(user_id = %user, amount = %amount, "Velocity counters incremented");
        Ok(VelocityOutcome::Allowed)
    }

    /// Single-window form of [`Self::check_and_increment_at`]
    pub async fn check_and_increment(
        &self,
        user: &UserId,
        window: VelocityWindow,
        amount: Amount,
        max_count: u32,
    ) -> VelocityResult<VelocityOutcome> {
        self.check_and_increment_at(user, amount, &[WindowLimit::count(window, max_count)], Utc::now())
            .await
    }

    pub fn has_user(&self, user: &UserId) -> bool {
        VelocityWindow::ALL
            .iter()
            .any(|w| self.rows.contains_key(&(user.clone(), *w)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(v: i64) -> Amount {
        Amount::new(v).unwrap()
    }

    #[tokio::test]
    async fn test_empty_usage() {
        let tracker = VelocityTracker::new();
        let usage = tracker.usage(&UserId::new("alice"), VelocityWindow::Day).await;
        assert_eq!(usage.count, 0);
        assert_eq!(usage.amount, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_increment_all_windows() {
        let tracker = VelocityTracker::new();
        let alice = UserId::new("alice");
        let now = Utc::now();

        let outcome = tracker
            .check_and_increment_at(&alice, amt(250), &[WindowLimit::count(VelocityWindow::Day, 5)], now)
            .await
            .unwrap();
        assert!(outcome.is_allowed());

        for window in VelocityWindow::ALL {
            let usage = tracker.usage_at(&alice, window, now).await;
            assert_eq!(usage.count, 1);
            assert_eq!(usage.amount, amt(250));
        }
    }

    #[tokio::test]
    async fn test_count_ceiling() {
        let tracker = VelocityTracker::new();
        let alice = UserId::new("alice");
        let now = Utc::now();
        let limits = [WindowLimit::count(VelocityWindow::Day, 2)];

        for _ in 0..2 {
            let outcome = tracker.check_and_increment_at(&alice, amt(1), &limits, now).await.unwrap();
            assert!(outcome.is_allowed());
        }
        let outcome = tracker.check_and_increment_at(&alice, amt(1), &limits, now).await.unwrap();
        assert_eq!(
            outcome,
            VelocityOutcome::CountExceeded {
                window: VelocityWindow::Day,
                count: 2,
                limit: 2
            }
        );
        // a denied check does not consume budget
        assert_eq!(tracker.usage_at(&alice, VelocityWindow::Day, now).await.count, 2);
    }

    #[tokio::test]
    async fn test_amount_ceiling_leaves_counters_untouched() {
        let tracker = VelocityTracker::new();
        let alice = UserId::new("alice");
        let now = Utc::now();
        let limits = [WindowLimit::amount(VelocityWindow::Month, amt(1_000))];

        tracker.check_and_increment_at(&alice, amt(900), &limits, now).await.unwrap();
        let outcome = tracker.check_and_increment_at(&alice, amt(200), &limits, now).await.unwrap();

        assert!(matches!(outcome, VelocityOutcome::AmountExceeded { used, .. } if used == amt(900)));
        assert_eq!(tracker.usage_at(&alice, VelocityWindow::Day, now).await.amount, amt(900));
    }

    #[tokio::test]
    async fn test_lazy_reset_slides_from_first_use() {
        let tracker = VelocityTracker::new();
        let alice = UserId::new("alice");
        let start = Utc::now();

        tracker.check_and_increment_at(&alice, amt(10), &[], start).await.unwrap();

        // Well after expiry: boundary is recomputed from the access time
        let later = start + Duration::days(1) + Duration::hours(5);
        let usage = tracker.usage_at(&alice, VelocityWindow::Day, later).await;
        assert_eq!(usage.count, 0);
        assert_eq!(usage.reset_at, later + Duration::days(1));

        // The week window has not expired yet
        let week = tracker.usage_at(&alice, VelocityWindow::Week, later).await;
        assert_eq!(week.count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_after_expiry_single_boundary() {
        let tracker = Arc::new(VelocityTracker::new());
        let alice = UserId::new("alice");
        let start = Utc::now();
        tracker.check_and_increment_at(&alice, amt(1), &[], start).await.unwrap();

        let first_after = start + Duration::days(2);
        let mut handles = Vec::new();
        for i in 0..8 {
            let tracker = tracker.clone();
            let alice = alice.clone();
            // later callers see a slightly later clock
            let now = first_after + Duration::seconds(i);
            handles.push(tokio::spawn(async move {
                tracker.usage_at(&alice, VelocityWindow::Day, now).await.reset_at
            }));
        }

        let mut boundaries = Vec::new();
        for handle in handles {
            boundaries.push(handle.await.unwrap());
        }
        boundaries.dedup();
        assert_eq!(boundaries.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_respect_ceiling() {
        let tracker = Arc::new(VelocityTracker::new());
        let alice = UserId::new("alice");
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let tracker = tracker.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                tracker
                    .check_and_increment_at(&alice, amt(1), &[WindowLimit::count(VelocityWindow::Day, 5)], now)
                    .await
                    .unwrap()
                    .is_allowed()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }
}
