//! Stash Risk Scorer
//!
//! 0-100 advisory score over the trailing 7 days of a user's history:
//!
//! | Rule | Points |
//! |------|--------|
//! | amount > 5x trailing average | 30 |
//! | trailing count > 20 | min(30, (count - 20) * 2) |
//! | location not seen in the window | 20 |
//! | hour in [23:00, 05:00) | 15 |
//! | category not seen in the window | 15 |
//!
//! Scores above 70 are high risk.

pub mod config;
pub mod error;
pub mod scorer;

pub use config::{RiskConfig, RiskWeights};
pub use error::{RiskError, RiskResult};
pub use scorer::{score_against, RiskScorer};
