//! Gate errors
//!
//! These are infrastructure failures only. Business denials are
//! [`crate::GateDecision::Deny`] values.

use stash_policy::PolicyError;
use stash_velocity::VelocityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Policy lookup failed: {0}")]
    Policy(#[from] PolicyError),

    #[error("Velocity tracker failed: {0}")]
    Velocity(#[from] VelocityError),

    #[error("Gate timeout after {0}ms")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type GateResult<T> = Result<T, GateError>;
