use async_trait::async_trait;
use stash_policy::PolicyStore;
use stash_velocity::{VelocityOutcome, VelocityTracker, VelocityWindow, WindowLimit};
use std::sync::Arc;

use crate::context::AdmissionContext;
use crate::decision::{DenyReason, GateDecision};
use crate::error::GateResult;
use crate::gate::Gate;

/// Transaction-count ceilings per window. The only gate with a side effect:
/// on pass, the event is counted in every window. Must run last.
pub struct VelocityGate {
    policy: Arc<dyn PolicyStore>,
    velocity: Arc<VelocityTracker>,
}

impl VelocityGate {
    pub fn new(policy: Arc<dyn PolicyStore>, velocity: Arc<VelocityTracker>) -> Self {
        Self { policy, velocity }
    }
}

#[async_trait]
impl Gate for VelocityGate {
    fn name(&self) -> &'static str {
        "velocity"
    }

    fn deny_reason(&self) -> DenyReason {
        DenyReason::VelocityExceeded
    }

    async fn evaluate(&self, ctx: &AdmissionContext) -> GateResult<GateDecision> {
        let tier = self.policy.limit_tier(ctx.actor.kyc_tier).await?.value;

        let limits = [
            WindowLimit::count(VelocityWindow::Day, tier.daily_tx_count),
            WindowLimit::count(VelocityWindow::Week, tier.weekly_tx_count),
            WindowLimit::count(VelocityWindow::Month, tier.monthly_tx_count),
            // caps again, now under the row locks
            WindowLimit::amount(VelocityWindow::Day, tier.daily_limit),
            WindowLimit::amount(VelocityWindow::Month, tier.monthly_limit),
        ];

        let outcome = self
            .velocity
            .check_and_increment_at(&ctx.actor.id, ctx.amount, &limits, ctx.now)
            .await?;

        Ok(match outcome {
            VelocityOutcome::Allowed => GateDecision::Pass,
            VelocityOutcome::CountExceeded { window, count, limit } => GateDecision::deny(
                DenyReason::VelocityExceeded,
                format!("{} transaction limit of {} reached ({} so far)", window, limit, count),
            ),
            VelocityOutcome::AmountExceeded {
                window,
                used,
                requested,
                limit,
            } => GateDecision::deny(
                DenyReason::CapExceeded,
                format!(
                    "{} cap of {} would be exceeded (used {}, requested {})",
                    window, limit, used, requested
                ),
            ),
        })
    }
}
