use async_trait::async_trait;

use crate::context::AdmissionContext;
use crate::decision::{DenyReason, GateDecision};
use crate::error::GateResult;
use crate::gate::Gate;

/// A limited actor may receive funds but not send them.
///
/// Only outgoing events are checked; incoming events always pass,
/// whatever the limitation state. An expired temporary limitation counts
/// as lifted.
#[derive(Debug, Default)]
pub struct LimitationGate;

impl LimitationGate {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Gate for LimitationGate {
    fn name(&self) -> &'static str {
        "limitation"
    }

    fn deny_reason(&self) -> DenyReason {
        DenyReason::LimitationBlocked
    }

    async fn evaluate(&self, ctx: &AdmissionContext) -> GateResult<GateDecision> {
        if !ctx.is_outgoing() || !ctx.actor.is_limited_at(ctx.now) {
            return Ok(GateDecision::Pass);
        }
        Ok(GateDecision::deny(
            DenyReason::LimitationBlocked,
            format!(
                "Account is under a {} limitation; outgoing {} is not permitted",
                ctx.actor.limitation_state, ctx.kind
            ),
        ))
    }
}
