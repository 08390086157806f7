//! Stash Envelope Ledger
//!
//! Per-user envelope balances, percentages, targets and status.
//!
//! - income is split across active envelopes, the rounding remainder going
//!   to the first envelope in canonical order
//! - peer transfers, expenses and loan draws are single units of work
//!   under per-account locks
//! - callers may pass an idempotency key; a replay returns the first
//!   receipt without moving money again
//!
//! No operation creates or destroys funds except income and expense entry.

pub mod allocation;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod repository;
pub mod request;
pub mod snapshot;

pub use allocation::{assess, split, validate_percentages, Gap, StatusAssessment};
pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use ledger::EnvelopeLedger;
pub use repository::{
    EnvelopeLogRepository, InMemoryEnvelopeLogRepository, InMemoryTransactionRepository, MetadataCorrection,
    TransactionRepository,
};
pub use request::{DisbursementReceipt, DrawLine, EntryDetails, ExpenseReceipt, IncomeReceipt, TransferReceipt};
pub use snapshot::{AccountView, AuditReport, EnvelopeSnapshot};
