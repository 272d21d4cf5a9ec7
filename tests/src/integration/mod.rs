//! # Integration Flows
//!
//! Every flow runs through the single in-memory channel: producers submit to
//! the gateway, the gate publishes ack requests, a scripted Core answers on
//! the channel and the decision listener resolves the request.
//!
//! Deadlines use Tokio time (`start_paused`), signal freshness uses a shared
//! `ManualClock`.

pub mod audit_flows;
pub mod authorization_flows;
pub mod channel_flows;
pub mod security_flows;

use crate::core_stub::{CoreHandle, CoreScript, CoreStub};
use gateway_runtime::{GatewayConfig, TrustGateway};
use serde_json::{json, Value};
use shared_bus::{ChannelGateway, GatewayEvent};
use shared_types::{Clock, Decision, DecisionEnvelope, ManualClock, RequestId, SharedSecret};
use std::sync::Arc;
use std::time::Duration;

/// Wall-clock start of every test scenario.
pub const T0: u64 = 1_700_000_000;

pub struct TestGateway {
    pub gateway: TrustGateway,
    pub clock: Arc<ManualClock>,
    pub secret: SharedSecret,
}

impl TestGateway {
    pub fn start(ack_timeout_secs: u64) -> Self {
        Self::start_with(|config| config.ack_timeout = Duration::from_secs(ack_timeout_secs))
    }

    pub fn start_with(tune: impl FnOnce(&mut GatewayConfig)) -> Self {
        let secret = SharedSecret::generate();
        let clock = Arc::new(ManualClock::new(T0));
        let mut config = GatewayConfig {
            shared_secret: Some(secret.clone()),
            ..GatewayConfig::default()
        };
        tune(&mut config);
        let gateway = TrustGateway::start_with_clock(config, clock.clone() as Arc<dyn Clock>)
            .expect("gateway starts");
        Self {
            gateway,
            clock,
            secret,
        }
    }

    /// Start a Core stub on this gateway's channel.
    pub fn core(&self, script: CoreScript) -> CoreHandle {
        let (handle, _task) = CoreStub::new(
            Arc::clone(self.gateway.channel()),
            self.secret.clone(),
            self.clock.clone(),
            script,
        )
        .spawn();
        handle
    }

    /// Publish a decision on the channel as Core would.
    pub async fn decide(&self, request_id: RequestId, decision: Decision) -> usize {
        self.gateway
            .channel()
            .publish(GatewayEvent::DecisionIssued(DecisionEnvelope {
                request_id,
                decision,
                issued_at: self.clock.now_secs(),
            }))
            .await
    }

    /// Event types recorded for one request, in chain order.
    pub fn audit_trail(&self, request_id: RequestId) -> Vec<&'static str> {
        self.gateway
            .audit()
            .entries_for(request_id)
            .expect("audit readable")
            .iter()
            .map(|entry| entry.event_type())
            .collect()
    }
}

/// The `u1` restriction draft used throughout the scenarios.
pub fn u1_restrict_draft() -> Value {
    json!({
        "subject_id": "u1",
        "context": "game",
        "kind": "restrict",
        "severity": 0.8,
        "reason_code": "CHEAT_DETECTED_001",
        "ttl": 30,
        "requires_ack": true,
        "action_type": "restriction",
    })
}

pub fn draft_for(subject: &str, action_type: &str) -> Value {
    let mut draft = u1_restrict_draft();
    draft["subject_id"] = json!(subject);
    draft["action_type"] = json!(action_type);
    draft
}

pub fn advisory_draft(subject: &str) -> Value {
    json!({
        "subject_id": subject,
        "context": "assistant",
        "kind": "nudge",
        "severity": 0.3,
        "reason_code": "TONE_WARNING",
        "ttl": 60,
        "requires_ack": false,
    })
}
