//! Stash RPC - application wiring and CLI orchestrator
//!
//! Builds the [`AppContext`] from configuration and exposes the inbound
//! event submission boundary used by the `stash` binary.

pub mod commands;
pub mod config;
pub mod context;
pub mod seed;
pub mod submission;

pub use config::AppConfig;
pub use context::AppContext;
pub use seed::{EnvelopeSeed, Seed, UserSeed};
pub use submission::{InboundEvent, SubmissionOutcome, SubmitError};
