use async_trait::async_trait;
use stash_policy::PolicyStore;
use std::sync::Arc;

use crate::context::AdmissionContext;
use crate::decision::{DenyReason, GateDecision};
use crate::error::GateResult;
use crate::gate::Gate;

/// Origin IP must not fall in any denied CIDR range
pub struct IpGate {
    policy: Arc<dyn PolicyStore>,
}

impl IpGate {
    pub fn new(policy: Arc<dyn PolicyStore>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Gate for IpGate {
    fn name(&self) -> &'static str {
        "ip"
    }

    fn deny_reason(&self) -> DenyReason {
        DenyReason::IpBlocked
    }

    async fn evaluate(&self, ctx: &AdmissionContext) -> GateResult<GateDecision> {
        let denylist = self.policy.ip_denylist().await?;
        match denylist.value.matching(&ctx.origin_ip) {
            Some(range) => Ok(GateDecision::deny(
                DenyReason::IpBlocked,
                format!("Origin {} is within denied range {}", ctx.origin_ip, range),
            )),
            None => Ok(GateDecision::Pass),
        }
    }
}
