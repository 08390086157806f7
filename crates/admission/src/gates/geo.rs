use async_trait::async_trait;
use stash_policy::PolicyStore;
use std::sync::Arc;

use crate::context::AdmissionContext;
use crate::decision::{DenyReason, GateDecision};
use crate::error::GateResult;
use crate::gate::Gate;

/// Actor's country must be on the allowlist
pub struct GeoGate {
    policy: Arc<dyn PolicyStore>,
}

impl GeoGate {
    pub fn new(policy: Arc<dyn PolicyStore>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Gate for GeoGate {
    fn name(&self) -> &'static str {
        "geo"
    }

    fn deny_reason(&self) -> DenyReason {
        DenyReason::GeoBlocked
    }

    async fn evaluate(&self, ctx: &AdmissionContext) -> GateResult<GateDecision> {
        let geo = self.policy.geo_policy().await?;
        if geo.value.allows(&ctx.actor.country) {
            return Ok(GateDecision::Pass);
        }
        Ok(GateDecision::deny(
            DenyReason::GeoBlocked,
            format!(
                "Country '{}' is not on the allowlist (geo policy v{})",
                ctx.actor.country, geo.version
            ),
        ))
    }
}
