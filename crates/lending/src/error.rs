//! Lending errors

use stash_core::UserId;
use stash_ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LendingError {
    #[error("Lender can cover {available} of {principal}, short by {shortfall}")]
    InsufficientCapacity {
        principal: i64,
        available: i64,
        shortfall: i64,
    },

    #[error("User {0} has no active {1} envelope")]
    NoAccount(UserId, String),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for LendingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCapacity { available, requested } => LendingError::InsufficientCapacity {
                principal: requested,
                available,
                shortfall: requested - available,
            },
            other => LendingError::Ledger(other),
        }
    }
}

pub type LendingResult<T> = Result<T, LendingError>;
