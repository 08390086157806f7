//! Risk scorer errors

use stash_ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskError {
    #[error("History lookup failed: {0}")]
    History(#[from] LedgerError),
}

pub type RiskResult<T> = Result<T, RiskError>;
