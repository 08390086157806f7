//! Stash Velocity Tracker
//!
//! Per-user, per-window (day/week/month) counters of transaction count and
//! amount. The caps gate reads them; the velocity gate is the only writer.

pub mod error;
pub mod tracker;

pub use error::{VelocityError, VelocityResult};
pub use tracker::{VelocityCounter, VelocityOutcome, VelocityTracker, VelocityWindow, WindowLimit, WindowUsage};
