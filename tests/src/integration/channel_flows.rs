//! # Channel Flows
//!
//! The single permitted transport: stamps bind events to the wired channel,
//! at-least-once delivery collapses to exactly-once acceptance, and the
//! JSON-lines command surface drives a full round trip.

#[cfg(test)]
mod tests {
    use crate::core_stub::CoreScript;
    use crate::integration::{advisory_draft, u1_restrict_draft, TestGateway, T0};
    use gateway_runtime::CommandHandler;
    use kg_02_security_manager::{SecurityManager, SignalSecurity};
    use kg_04_authorization_gate::{DecisionHandler, Delivery, GateError, Origin};
    use serde_json::json;
    use shared_bus::{
        ChannelError, ChannelGateway, EventFilter, EventTopic, GatewayEvent, InMemoryChannel,
        ReplayCache,
    };
    use shared_types::{
        ActionRequest, ActionType, AuthorizationState, Clock, Decision, DecisionEnvelope,
        ProductContext, ReasonCode, SharedSecret, SignalDraft, SignalKind, SubjectId,
    };
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// A producer signing with its own replay cache.
    fn producer(t: &TestGateway, secret: SharedSecret) -> SecurityManager {
        let clock = t.clock.clone() as Arc<dyn Clock>;
        let cache = Arc::new(ReplayCache::new(100, 3_600, clock.clone()));
        SecurityManager::new(secret, cache, clock)
    }

    fn advisory() -> SignalDraft {
        SignalDraft {
            subject_id: SubjectId::parse("u9").unwrap(),
            context: ProductContext::Workflow,
            kind: SignalKind::Nudge,
            severity: 0.2,
            reason_code: ReasonCode::parse("IDLE_REMINDER").unwrap(),
            ttl: 60,
            requires_ack: false,
        }
    }

    fn action(subject: &str) -> ActionRequest {
        ActionRequest::for_action(
            SubjectId::parse(subject).unwrap(),
            ProductContext::Finance,
            ActionType::AccessGating,
            60,
        )
    }

    async fn wait_for_entries(t: &TestGateway, count: u64) {
        while t.gateway.audit().summary().total_entries < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    // =============================================================================
    // CHANNEL STAMPS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_decision_from_foreign_channel_is_refused() {
        let t = TestGateway::start(10);
        let core = t.core(CoreScript::Silent);
        let pending = t.gateway.gate().begin(action("u1")).await.unwrap();
        core.wait_for(1).await;

        // A look-alike channel delivers a forged ALLOW.
        let rogue = InMemoryChannel::new();
        let rogue_listener = DecisionHandler::new(t.gateway.gate().clone());
        let mut rogue_sub = rogue.subscribe(EventFilter::topics(vec![EventTopic::Decisions]));
        rogue
            .publish(GatewayEvent::DecisionIssued(DecisionEnvelope {
                request_id: pending.request_id(),
                decision: Decision::Allow,
                issued_at: T0,
            }))
            .await;
        let delivered = rogue_sub.recv().await.unwrap();
        let result = rogue_listener.handle(delivered).await.unwrap();
        assert!(matches!(
            result,
            Err(GateError::UnauthorizedChannel {
                reason: "FOREIGN_CHANNEL"
            })
        ));

        // And an in-process call skips the channel entirely.
        let direct = t
            .gateway
            .gate()
            .deliver(
                Origin::Direct,
                DecisionEnvelope {
                    request_id: pending.request_id(),
                    decision: Decision::Allow,
                    issued_at: T0,
                },
            )
            .await;
        assert!(matches!(
            direct,
            Err(GateError::UnauthorizedChannel {
                reason: "DIRECT_CALL"
            })
        ));
        assert_eq!(
            t.gateway.audit().summary().counts.get("UNAUTHORIZED_CHANNEL"),
            Some(&2)
        );

        // Still pending; Core's real DENY decides it.
        assert_eq!(t.gateway.summary().pending_requests, 1);
        t.decide(pending.request_id(), Decision::Deny).await;
        let outcome = pending.outcome().await.unwrap();
        assert_eq!(outcome.state(), AuthorizationState::Denied);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_for_unknown_request_is_ignored() {
        let t = TestGateway::start(10);
        let mut decisions = t
            .gateway
            .channel()
            .subscribe(EventFilter::topics(vec![EventTopic::Decisions]));
        let stranger = shared_types::RequestId::new();
        t.decide(stranger, Decision::Allow).await;

        let delivered = decisions.recv().await.unwrap();
        let handler = DecisionHandler::new(t.gateway.gate().clone());
        let result = handler.handle(delivered).await.unwrap().unwrap();
        assert_eq!(
            result,
            Delivery::Ignored {
                request_id: stranger,
                reason: "UNKNOWN_REQUEST"
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_times_out_on_quiet_channel() {
        let channel = InMemoryChannel::new();
        let mut sub = channel.subscribe(EventFilter::topics(vec![EventTopic::Decisions]));
        channel
            .publish(GatewayEvent::SignalPublished(
                SecurityManager::new(
                    SharedSecret::generate(),
                    Arc::new(ReplayCache::new(10, 60, Arc::new(shared_types::SystemClock))),
                    Arc::new(shared_types::SystemClock),
                )
                .sign(&advisory())
                .unwrap(),
            ))
            .await;

        // Non-matching events do not satisfy the wait.
        assert_eq!(
            sub.receive(Duration::from_secs(2)).await.unwrap_err(),
            ChannelError::Timeout(Duration::from_secs(2))
        );
    }

    // =============================================================================
    // INGRESS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_redelivered_signal_accepted_once() {
        let t = TestGateway::start(10);
        let signal = producer(&t, t.secret.clone()).sign(&advisory()).unwrap();

        t.gateway
            .channel()
            .publish(GatewayEvent::SignalPublished(signal.clone()))
            .await;
        t.gateway
            .channel()
            .publish(GatewayEvent::SignalPublished(signal))
            .await;
        wait_for_entries(&t, 2).await;

        let summary = t.gateway.summary();
        assert_eq!(summary.audit.counts.get("SIGNAL_ACCEPTED"), Some(&1));
        assert_eq!(summary.audit.counts.get("SIGNAL_REJECTED"), Some(&1));
        assert_eq!(summary.security.replay_attempts, 1);

        let rejected = t.gateway.export().unwrap().pop().unwrap();
        assert_eq!(
            serde_json::to_value(&rejected.event).unwrap()["reason"],
            "REPLAY_DETECTED"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_forged_signal_on_channel_rejected() {
        let t = TestGateway::start(10);
        let forged = producer(&t, SharedSecret::generate())
            .sign(&advisory())
            .unwrap();

        t.gateway
            .channel()
            .publish(GatewayEvent::SignalPublished(forged))
            .await;
        wait_for_entries(&t, 1).await;

        let entry = t.gateway.export().unwrap().pop().unwrap();
        assert_eq!(entry.event_type(), "SIGNAL_REJECTED");
        assert_eq!(
            serde_json::to_value(&entry.event).unwrap()["reason"],
            "SIGNATURE_INVALID"
        );
        assert_eq!(t.gateway.summary().security.verified_total, 0);
    }

    // =============================================================================
    // COMMAND SURFACE
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_json_lines_round_trip() {
        let t = TestGateway::start(10);
        let mut core_view = t
            .gateway
            .channel()
            .subscribe(EventFilter::topics(vec![EventTopic::AckRequests]));
        let gateway = Arc::new(t.gateway);
        let handler = CommandHandler::new(Arc::clone(&gateway));

        let published = handler
            .handle_line(&json!({ "cmd": "submit", "draft": advisory_draft("u5") }).to_string())
            .await;
        assert!(published.ok);
        assert_eq!(published.result.unwrap()["status"], "published");

        let authorize = {
            let handler = handler.clone();
            let line = json!({ "cmd": "authorize", "draft": u1_restrict_draft() }).to_string();
            tokio::spawn(async move { handler.handle_line(&line).await })
        };

        // Core reads the wire form of the ack request and answers by command.
        let ack = core_view.recv().await.unwrap();
        let wire = serde_json::to_value(ack.event.to_wire()).unwrap();
        assert_eq!(wire["type"], "ack_request");
        let request_id = wire["request_id"].as_str().unwrap().to_string();

        let decision = handler
            .handle_line(
                &json!({
                    "cmd": "decision",
                    "decision": { "request_id": request_id, "decision": "ALLOW", "issued_at": T0 }
                })
                .to_string(),
            )
            .await;
        assert!(decision.ok);

        let response = authorize.await.unwrap();
        assert!(response.ok);
        assert!(response.code.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["state"], "ALLOWED");
        assert_eq!(result["request_id"], request_id.as_str());

        let verify = handler.handle_line(r#"{"cmd":"verify_chain"}"#).await;
        assert_eq!(verify.result.unwrap()["valid"], true);
        let export = handler.handle_line(r#"{"cmd":"export"}"#).await;
        let exported = export.result.unwrap();
        assert!(exported
            .as_array()
            .unwrap()
            .iter()
            .any(|entry| entry["event"]["event_type"] == "REQUEST_ALLOWED"));
    }
}
