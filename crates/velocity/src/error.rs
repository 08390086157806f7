//! Velocity tracker errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VelocityError {
    #[error("Velocity counter overflow")]
    Overflow,
}

pub type VelocityResult<T> = Result<T, VelocityError>;
