//! Stash Risk Events
//!
//! Append-only record of gate denials, operational failures and high-risk
//! transactions, and the sink through which they reach downstream
//! logging/alerting.

pub mod error;
pub mod event;
pub mod log;

pub use error::{EventLogError, EventLogResult};
pub use event::{RiskEvent, RiskEventKind};
pub use log::{RiskEventSink, RiskLog};
