use async_trait::async_trait;
use stash_core::Amount;
use stash_policy::PolicyStore;
use stash_velocity::{VelocityError, VelocityTracker, VelocityWindow};
use std::sync::Arc;

use crate::context::AdmissionContext;
use crate::decision::{DenyReason, GateDecision};
use crate::error::GateResult;
use crate::gate::Gate;

/// Day and month amount caps for the actor's KYC tier.
///
/// Read-only: uses the velocity tracker's current usage. The velocity gate
/// re-checks the same caps while incrementing, so two concurrent requests
/// that both pass here cannot both commit past a cap.
pub struct CapsGate {
    policy: Arc<dyn PolicyStore>,
    velocity: Arc<VelocityTracker>,
}

impl CapsGate {
    pub fn new(policy: Arc<dyn PolicyStore>, velocity: Arc<VelocityTracker>) -> Self {
        Self { policy, velocity }
    }
}

#[async_trait]
impl Gate for CapsGate {
    fn name(&self) -> &'static str {
        "caps"
    }

    fn deny_reason(&self) -> DenyReason {
        DenyReason::CapExceeded
    }

    async fn evaluate(&self, ctx: &AdmissionContext) -> GateResult<GateDecision> {
        let tier = self.policy.limit_tier(ctx.actor.kyc_tier).await?.value;

        let caps: [(VelocityWindow, Amount); 2] = [
            (VelocityWindow::Day, tier.daily_limit),
            (VelocityWindow::Month, tier.monthly_limit),
        ];

        for (window, limit) in caps {
            let usage = self.velocity.usage_at(&ctx.actor.id, window, ctx.now).await;
            let projected = usage.amount.checked_add(&ctx.amount).ok_or(VelocityError::Overflow)?;
            if projected > limit {
                return Ok(GateDecision::deny(
                    DenyReason::CapExceeded,
                    format!(
                        "{} cap of {} for {} would be exceeded (used {}, requested {})",
                        window, limit, tier.tier, usage.amount, ctx.amount
                    ),
                ));
            }
        }

        Ok(GateDecision::Pass)
    }
}
