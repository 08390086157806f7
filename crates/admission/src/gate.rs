//! Gate trait

use async_trait::async_trait;

use crate::context::AdmissionContext;
use crate::decision::{DenyReason, GateDecision};
use crate::error::GateResult;

/// One policy check in the admission pipeline.
///
/// Return `Ok(GateDecision::Pass)` to continue, `Ok(GateDecision::Deny { .. })`
/// for a business-rule denial, `Err(_)` when the gate cannot decide. The
/// pipeline turns errors into fail-closed denials carrying
/// [`Gate::deny_reason`].
#[async_trait]
pub trait Gate: Send + Sync {
    /// Gate name for logging
    fn name(&self) -> &'static str;

    /// Reason reported when this gate denies or fails closed
    fn deny_reason(&self) -> DenyReason;

    async fn evaluate(&self, ctx: &AdmissionContext) -> GateResult<GateDecision>;
}
