//! Stash Admission Pipeline
//!
//! Decides whether an inbound money-movement event may reach the ledger.
//! Six independent gates run in a fixed order and the first denial wins:
//!
//! 1. geo - country allowlist
//! 2. ip - CIDR denylist
//! 3. device - required client signals
//! 4. limitation - limited actors cannot send
//! 5. caps - day/month amount caps per KYC tier
//! 6. velocity - count ceilings; increments the counters on pass
//!
//! Denials are values ([`Decision::Deny`]), not errors. A gate that cannot
//! decide fails closed.

pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod gate;
pub mod gates;
pub mod pipeline;

pub use config::{AdmissionConfig, FailPolicy};
pub use context::AdmissionContext;
pub use decision::{Decision, Denial, DenyReason, GateDecision};
pub use error::{GateError, GateResult};
pub use gate::Gate;
pub use gates::{CapsGate, DeviceGate, GeoGate, IpGate, LimitationGate, VelocityGate};
pub use pipeline::AdmissionPipeline;
