//! Policy errors

use stash_core::KycTier;
use thiserror::Error;

/// Errors from the policy store and user directory
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy store unavailable: {0}")]
    Unavailable(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid CIDR range: {0}")]
    InvalidCidr(String),

    #[error("No limit tier configured for {0}")]
    TierNotConfigured(KycTier),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Result type for policy operations
pub type PolicyResult<T> = Result<T, PolicyError>;
