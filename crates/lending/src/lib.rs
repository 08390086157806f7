//! Stash Lending
//!
//! Peer loans between envelope owners:
//! - capacity preview over the lender's lendable envelopes
//! - approval as one atomic multi-source disbursement
//! - repayment through the transfer protocol

pub mod capacity;
pub mod config;
pub mod desk;
pub mod error;

pub use capacity::{is_eligible, plan_draws, CapacityPreview};
pub use config::LendingConfig;
pub use desk::LoanDesk;
pub use error::{LendingError, LendingResult};
