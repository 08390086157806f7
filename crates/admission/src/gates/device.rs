use async_trait::async_trait;
use stash_policy::PolicyStore;
use std::sync::Arc;

use crate::context::AdmissionContext;
use crate::decision::{DenyReason, GateDecision};
use crate::error::GateResult;
use crate::gate::Gate;

/// Client must present at least `min_signals` of the required signals
pub struct DeviceGate {
    policy: Arc<dyn PolicyStore>,
}

impl DeviceGate {
    pub fn new(policy: Arc<dyn PolicyStore>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Gate for DeviceGate {
    fn name(&self) -> &'static str {
        "device"
    }

    fn deny_reason(&self) -> DenyReason {
        DenyReason::DeviceBlocked
    }

    async fn evaluate(&self, ctx: &AdmissionContext) -> GateResult<GateDecision> {
        let rule = self.policy.device_rule().await?;
        let satisfied = rule.value.satisfied_count(&ctx.device_signals);
        if satisfied >= rule.value.min_signals {
            return Ok(GateDecision::Pass);
        }
        Ok(GateDecision::deny(
            DenyReason::DeviceBlocked,
            format!(
                "Device presented {} of {} required signals",
                satisfied, rule.value.min_signals
            ),
        ))
    }
}
