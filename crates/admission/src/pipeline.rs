//! Admission pipeline - runs the gates in their fixed order

use stash_events::{RiskEvent, RiskEventSink};
use stash_policy::PolicyStore;
use stash_velocity::VelocityTracker;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AdmissionConfig, FailPolicy};
use crate::context::AdmissionContext;
use crate::decision::{Decision, Denial, GateDecision};
use crate::error::GateError;
use crate::gate::Gate;
use crate::gates::{CapsGate, DeviceGate, GeoGate, IpGate, LimitationGate, VelocityGate};

/// Ordered gate runner.
///
/// Gates run geo, ip, device, limitation, caps, velocity and the first
/// denial short-circuits. Velocity must stay last: it is the only gate that
/// writes, and a request denied earlier must not consume velocity budget.
///
/// Every denial is recorded on the risk sink before the decision is
/// returned. A gate that errors or exceeds its timeout denies with
/// `fail_closed = true` and is recorded as an operational error.
pub struct AdmissionPipeline {
    gates: Vec<Arc<dyn Gate>>,
    sink: Arc<dyn RiskEventSink>,
    gate_timeout: Duration,
}

impl AdmissionPipeline {
    /// Build the standard six-gate pipeline
    pub fn new(
        policy: Arc<dyn PolicyStore>,
        velocity: Arc<VelocityTracker>,
        sink: Arc<dyn RiskEventSink>,
        config: &AdmissionConfig,
    ) -> Self {
        let gates: Vec<Arc<dyn Gate>> = vec![
            Arc::new(GeoGate::new(policy.clone())),
            Arc::new(IpGate::new(policy.clone())),
            Arc::new(DeviceGate::new(policy.clone())),
            Arc::new(LimitationGate::new()),
            Arc::new(CapsGate::new(policy.clone(), velocity.clone())),
            Arc::new(VelocityGate::new(policy, velocity)),
        ];
        Self::with_gates(gates, sink, config)
    }

    /// Pipeline over an explicit gate list, run in the given order
    pub fn with_gates(gates: Vec<Arc<dyn Gate>>, sink: Arc<dyn RiskEventSink>, config: &AdmissionConfig) -> Self {
        if config.fail_policy == FailPolicy::FailOpen {
            tracing::warn!("fail_open is not supported for admission; gates fail closed");
        }
        Self {
            gates,
            sink,
            gate_timeout: Duration::from_millis(config.gate_timeout_ms),
        }
    }

    pub fn gate_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Evaluate an event. Never fails: infrastructure problems become denials.
    pub async fn evaluate(&self, ctx: &AdmissionContext) -> Decision {
        for gate in &self.gates {
            let result = match tokio::time::timeout(self.gate_timeout, gate.evaluate(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(GateError::Timeout(self.gate_timeout.as_millis() as u64)),
            };

            match result {
                Ok(GateDecision::Pass) => {
                    tracing::debug!(gate = gate.name(), user_id = %ctx.actor.id, "Gate passed");
                }
                Ok(GateDecision::Deny { reason, summary }) => {
                    tracing::warn!(
                        gate = gate.name(),
                        user_id = %ctx.actor.id,
                        reason = %reason,
                        summary = %summary,
                        "Gate denied event"
                    );
                    let event = RiskEvent::gate_denied(ctx.actor.id.clone(), gate.name(), reason.code(), &summary);
                    self.record(event).await;
                    return Decision::Deny(Denial {
                        reason,
                        summary,
                        gate: gate.name().to_string(),
                        fail_closed: false,
                    });
                }
                Err(e) => {
                    let reason = gate.deny_reason();
                    tracing::error!(
                        gate = gate.name(),
                        user_id = %ctx.actor.id,
                        error = %e,
                        "Gate failed, denying (fail-closed)"
                    );
                    let event =
                        RiskEvent::operational_error(ctx.actor.id.clone(), gate.name(), reason.code(), &e.to_string());
                    self.record(event).await;
                    return Decision::Deny(Denial {
                        reason,
                        summary: format!("Unable to verify {} policy; request denied", gate.name()),
                        gate: gate.name().to_string(),
                        fail_closed: true,
                    });
                }
            }
        }

        Decision::Allow
    }

    async fn record(&self, event: RiskEvent) {
        // The denial stands whether or not the event could be written.
        if let Err(e) = self.sink.record(event).await {
            tracing::error!(error = %e, "Failed to record risk event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DenyReason;
    use crate::error::GateResult;
    use async_trait::async_trait;
    use stash_core::{Amount, Direction, EventKind, KycTier, LimitationState, User};
    use stash_events::{RiskEventKind, RiskLog};
    use stash_policy::{
        DeviceRule, DeviceSignals, GeoPolicy, InMemoryPolicyStore, IpDenylist, LimitTier, PolicyError,
        PolicyResult, PolicySnapshot, Versioned,
    };
    use stash_velocity::VelocityWindow;

    fn amt(v: i64) -> Amount {
        Amount::new(v).unwrap()
    }

    fn snapshot() -> PolicySnapshot {
        PolicySnapshot {
            geo: GeoPolicy::allowlist(["US", "CA"]),
            ip_denylist: IpDenylist::parse(["10.0.0.0/8"]).unwrap(),
            device: DeviceRule::default(),
            tiers: vec![],
        }
    }

    struct Fixture {
        pipeline: AdmissionPipeline,
        velocity: Arc<VelocityTracker>,
        log: Arc<RiskLog>,
    }

    fn fixture_with(policy: Arc<dyn PolicyStore>) -> Fixture {
        let velocity = Arc::new(VelocityTracker::new());
        let log = Arc::new(RiskLog::in_memory());
        let pipeline = AdmissionPipeline::new(policy, velocity.clone(), log.clone(), &AdmissionConfig::default());
        Fixture { pipeline, velocity, log }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryPolicyStore::new(snapshot())))
    }

    fn income(user: &User, amount: i64) -> AdmissionContext {
        AdmissionContext::new(user.clone(), EventKind::Income, Direction::Incoming, amt(amount))
    }

    fn outgoing(user: &User, amount: i64) -> AdmissionContext {
        AdmissionContext::new(user.clone(), EventKind::PeerTransfer, Direction::Outgoing, amt(amount))
    }

    #[tokio::test]
    async fn test_gate_order() {
        let f = fixture();
        assert_eq!(
            f.pipeline.gate_names(),
            vec!["geo", "ip", "device", "limitation", "caps", "velocity"]
        );
    }

    #[tokio::test]
    async fn test_allow_counts_velocity() {
        let f = fixture();
        let alice = User::new("alice", KycTier::Tier1, "US");

        let decision = f.pipeline.evaluate(&income(&alice, 1_000)).await;
        assert!(decision.is_allowed());

        let usage = f.velocity.usage(&alice.id, VelocityWindow::Day).await;
        assert_eq!(usage.count, 1);
        assert_eq!(usage.amount, amt(1_000));
        assert!(f.log.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_geo_denial_does_not_touch_velocity() {
        let f = fixture();
        let pierre = User::new("pierre", KycTier::Tier2, "FR");

        let decision = f.pipeline.evaluate(&income(&pierre, 100)).await;
        assert_eq!(decision.deny_reason(), Some(DenyReason::GeoBlocked));
        assert!(!f.velocity.has_user(&pierre.id));

        let events = f.log.read_all().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RiskEventKind::GateDenied);
        assert_eq!(events[0].reason.as_deref(), Some("geo_blocked"));
    }

    #[tokio::test]
    async fn test_ip_denylist() {
        let f = fixture();
        let alice = User::new("alice", KycTier::Tier1, "US");

        let ctx = income(&alice, 100).with_origin_ip("10.1.2.3".parse().unwrap());
        let decision = f.pipeline.evaluate(&ctx).await;
        assert_eq!(decision.deny_reason(), Some(DenyReason::IpBlocked));

        let ctx = income(&alice, 100).with_origin_ip("192.168.1.1".parse().unwrap());
        assert!(f.pipeline.evaluate(&ctx).await.is_allowed());
    }

    #[tokio::test]
    async fn test_headless_device_blocked() {
        let f = fixture();
        let alice = User::new("alice", KycTier::Tier1, "US");
        let signals = DeviceSignals {
            headless: true,
            ..DeviceSignals::browser()
        };

        let decision = f.pipeline.evaluate(&income(&alice, 100).with_device_signals(signals)).await;
        assert_eq!(decision.deny_reason(), Some(DenyReason::DeviceBlocked));
    }

    #[tokio::test]
    async fn test_limitation_blocks_outgoing_only() {
        let f = fixture();
        let mut bob = User::new("bob", KycTier::Tier1, "US");
        bob.limitation_state = LimitationState::Temporary30;
        bob.limitation_expires_at = Some(chrono::Utc::now() + chrono::Duration::days(30));

        assert!(f.pipeline.evaluate(&income(&bob, 5_000)).await.is_allowed());

        let decision = f.pipeline.evaluate(&outgoing(&bob, 1)).await;
        assert_eq!(decision.deny_reason(), Some(DenyReason::LimitationBlocked));

        // denied outgoing attempt consumed no velocity budget
        let usage = f.velocity.usage(&bob.id, VelocityWindow::Day).await;
        assert_eq!(usage.count, 1);
    }

    #[tokio::test]
    async fn test_expired_limitation_is_lifted() {
        let f = fixture();
        let mut bob = User::new("bob", KycTier::Tier1, "US");
        bob.limitation_state = LimitationState::Temporary30;
        bob.limitation_expires_at = Some(chrono::Utc::now() - chrono::Duration::days(1));

        assert!(f.pipeline.evaluate(&outgoing(&bob, 1)).await.is_allowed());
    }

    #[tokio::test]
    async fn test_daily_cap() {
        let f = fixture();
        let alice = User::new("alice", KycTier::Tier1, "US");

        assert!(f.pipeline.evaluate(&income(&alice, 20_000)).await.is_allowed());
        assert!(f.pipeline.evaluate(&income(&alice, 20_000)).await.is_allowed());
        let third = f.pipeline.evaluate(&income(&alice, 20_000)).await;
        assert_eq!(third.deny_reason(), Some(DenyReason::CapExceeded));

        let usage = f.velocity.usage(&alice.id, VelocityWindow::Day).await;
        assert_eq!(usage.amount, amt(40_000));
        assert_eq!(usage.count, 2);
    }

    #[tokio::test]
    async fn test_velocity_count_ceiling() {
        let f = fixture();
        let zed = User::new("zed", KycTier::Tier0, "US");
        let daily = LimitTier::default_for(KycTier::Tier0).daily_tx_count;

        for _ in 0..daily {
            assert!(f.pipeline.evaluate(&income(&zed, 1)).await.is_allowed());
        }
        let decision = f.pipeline.evaluate(&income(&zed, 1)).await;
        assert_eq!(decision.deny_reason(), Some(DenyReason::VelocityExceeded));
    }

    struct BrokenPolicy;

    #[async_trait]
    impl PolicyStore for BrokenPolicy {
        async fn geo_policy(&self) -> PolicyResult<Versioned<GeoPolicy>> {
            Err(PolicyError::Unavailable("connection refused".into()))
        }
        async fn ip_denylist(&self) -> PolicyResult<Versioned<IpDenylist>> {
            Err(PolicyError::Unavailable("connection refused".into()))
        }
        async fn device_rule(&self) -> PolicyResult<Versioned<DeviceRule>> {
            Err(PolicyError::Unavailable("connection refused".into()))
        }
        async fn limit_tier(&self, tier: KycTier) -> PolicyResult<Versioned<LimitTier>> {
            Err(PolicyError::TierNotConfigured(tier))
        }
    }

    #[tokio::test]
    async fn test_policy_failure_fails_closed() {
        let f = fixture_with(Arc::new(BrokenPolicy));
        let alice = User::new("alice", KycTier::Tier1, "US");

        let decision = f.pipeline.evaluate(&income(&alice, 100)).await;
        let denial = decision.denial().unwrap();
        assert!(denial.fail_closed);
        assert_eq!(denial.reason, DenyReason::GeoBlocked);
        assert!(!f.velocity.has_user(&alice.id));

        let events = f.log.read_all().await.unwrap();
        assert_eq!(events[0].kind, RiskEventKind::OperationalError);
    }

    struct SlowGate;

    #[async_trait]
    impl Gate for SlowGate {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn deny_reason(&self) -> DenyReason {
            DenyReason::DeviceBlocked
        }
        async fn evaluate(&self, _ctx: &AdmissionContext) -> GateResult<GateDecision> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(GateDecision::Pass)
        }
    }

    #[tokio::test]
    async fn test_gate_timeout_fails_closed() {
        let log = Arc::new(RiskLog::in_memory());
        let config = AdmissionConfig {
            gate_timeout_ms: 20,
            ..AdmissionConfig::default()
        };
        let pipeline = AdmissionPipeline::with_gates(vec![Arc::new(SlowGate)], log.clone(), &config);
        let alice = User::new("alice", KycTier::Tier1, "US");

        let decision = pipeline.evaluate(&income(&alice, 1)).await;
        let denial = decision.denial().unwrap();
        assert!(denial.fail_closed);
        assert_eq!(denial.gate, "slow");
    }
}
