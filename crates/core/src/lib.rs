//! Stash Core - Domain types
//!
//! Fundamental types shared by every Stash crate:
//! - `Amount`: non-negative money in minor units
//! - ids (`UserId`, `AccountId`, `TransactionId`, `IdempotencyKey`)
//! - `User` with KYC tier and limitation state
//! - `EnvelopeAccount` and its debt/surplus logs
//! - `Transaction` and inbound event kinds

pub mod account;
pub mod amount;
pub mod ids;
pub mod transaction;
pub mod user;

pub use account::{AccountStatus, AccountType, DebtLog, EnvelopeAccount, SurplusLog};
pub use amount::{Amount, AmountError};
pub use ids::{AccountId, IdempotencyKey, TransactionId, UserId};
pub use transaction::{
    AllocationLine, Direction, EventKind, FraudRisk, RiskFlag, Transaction, TransactionOrigin, TransactionType,
};
pub use user::{KycTier, Limitation, LimitationState, User};
