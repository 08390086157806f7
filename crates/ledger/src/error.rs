//! Ledger errors

use stash_core::{AccountId, AmountError, TransactionId, UserId};
use thiserror::Error;

/// Errors that can occur in ledger operations
///
/// Every variant is raised before any balance is written, or after the
/// unit of work has been rolled back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("User {0} has no active accounts")]
    NoActiveAccounts(UserId),

    #[error("Account {0} is inactive")]
    InactiveAccount(AccountId),

    #[error("Account {0} still holds funds")]
    NonZeroBalance(AccountId),

    #[error("Invalid percentages: {0}")]
    InvalidPercentages(String),

    #[error("Amount must be positive")]
    ZeroAmount,

    #[error("Insufficient funds in {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: i64,
        requested: i64,
    },

    #[error("Insufficient lendable capacity: available {available}, requested {requested}")]
    InsufficientCapacity { available: i64, requested: i64 },

    #[error("Peer transfer between accounts of the same user {0}")]
    SameOwner(UserId),

    #[error("Source and destination are the same account {0}")]
    SameAccount(AccountId),

    #[error("Accounts belong to different users ({0}, {1})")]
    OwnerMismatch(UserId, UserId),

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Lock timeout after {0}ms")]
    LockTimeout(u64),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Idempotency key {0} was already used for a different request")]
    IdempotencyConflict(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),
}

impl From<AmountError> for LedgerError {
    fn from(_: AmountError) -> Self {
        LedgerError::Overflow
    }
}

impl LedgerError {
    /// Infrastructure failures; everything else is a rejected request
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, LedgerError::LockTimeout(_) | LedgerError::Storage(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
