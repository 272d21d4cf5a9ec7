//! # Audit Flows
//!
//! The hash chain under real gateway traffic: linkage, tamper detection at
//! the first altered sequence, the integrity halt blocking new requests, and
//! manual clearance.

#[cfg(test)]
mod tests {
    use crate::core_stub::{CoreScript, CoreStub};
    use crate::integration::{u1_restrict_draft, TestGateway, T0};
    use gateway_runtime::{GatewayConfig, TrustGateway};
    use kg_01_signal_validator::SignalValidator;
    use kg_02_security_manager::{SecurityManager, SignalSecurity};
    use kg_03_audit_log::{
        genesis_hash, AuditError, AuditEvent, AuditLog, ChainHash, InMemoryAuditStore,
        Sha256Hasher,
    };
    use kg_04_authorization_gate::{AuthorizationGate, GateConfig, GateError};
    use shared_bus::{ChannelGateway, EventFilter, EventTopic, InMemoryChannel, ReplayCache};
    use shared_types::{
        ActionRequest, ActionType, AuthorizationState, Clock, Decision, GatewayError,
        GatewayState, ManualClock, ProductContext, RequestId, SharedSecret, SubjectId,
    };
    use std::sync::Arc;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct GateHarness {
        gate: AuthorizationGate,
        audit: AuditLog,
        store: Arc<InMemoryAuditStore>,
    }

    /// Gate wired by hand so the test keeps a handle on the raw store.
    fn gate_harness(core: CoreScript) -> GateHarness {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(T0));
        let secret = SharedSecret::generate();
        let cache = Arc::new(ReplayCache::new(1_000, 3_600, clock.clone()));
        let security: Arc<dyn SignalSecurity> =
            Arc::new(SecurityManager::new(secret.clone(), cache, clock.clone()));
        let channel = Arc::new(InMemoryChannel::new());
        let store = Arc::new(InMemoryAuditStore::new());
        let audit = AuditLog::open(store.clone(), Arc::new(Sha256Hasher), clock.clone()).unwrap();

        let gate = AuthorizationGate::new(
            GateConfig::default(),
            SignalValidator::default(),
            security,
            channel.clone(),
            audit.clone(),
            clock.clone(),
        );
        gate.spawn_decision_listener(
            channel.subscribe(EventFilter::topics(vec![EventTopic::Decisions])),
        );
        CoreStub::new(channel, secret, clock, core).spawn();

        GateHarness { gate, audit, store }
    }

    fn action(subject: &str) -> ActionRequest {
        ActionRequest::for_action(
            SubjectId::parse(subject).unwrap(),
            ProductContext::Gurukul,
            ActionType::ProgressionLock,
            60,
        )
    }

    fn mixed_events(count: usize) -> Vec<AuditEvent> {
        (0..count)
            .map(|i| {
                let request_id = RequestId::new();
                match i % 3 {
                    0 => AuditEvent::RequestCreated {
                        request_id,
                        action_type: ActionType::Death,
                        subject_id: SubjectId::parse("u1").unwrap(),
                        nonce: format!("{i:08x}"),
                    },
                    1 => AuditEvent::resolution(request_id, AuthorizationState::Allowed).unwrap(),
                    _ => AuditEvent::SignalRejected {
                        subject_id: None,
                        reason: "SCHEMA_VIOLATION".to_string(),
                    },
                }
            })
            .collect()
    }

    // =============================================================================
    // CHAIN PROPERTIES
    // =============================================================================

    #[tokio::test]
    async fn test_gateway_traffic_forms_linked_chain() {
        let h = gate_harness(CoreScript::Immediate(Decision::Allow));
        for subject in ["u1", "u2", "u3"] {
            let outcome = h.gate.authorize(action(subject)).await.unwrap();
            assert_eq!(outcome.state(), AuthorizationState::Allowed);
        }

        let entries = h.audit.export().unwrap();
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[0].prev_hash, genesis_hash(&Sha256Hasher));
        for pair in entries.windows(2) {
            assert_eq!(pair[1].prev_hash, pair[0].entry_hash);
            assert_eq!(pair[1].sequence_no, pair[0].sequence_no + 1);
        }
        assert_eq!(h.audit.verify_chain().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_single_flip_reported_at_first_tampered_sequence() {
        const N: usize = 6;
        for target in 0..N as u64 {
            for field in ["entry_hash", "payload_digest"] {
                let store = Arc::new(InMemoryAuditStore::new());
                let log = AuditLog::open(
                    store.clone(),
                    Arc::new(Sha256Hasher),
                    Arc::new(ManualClock::new(T0)),
                )
                .unwrap();
                for event in mixed_events(N) {
                    log.append(event).await.unwrap();
                }
                assert_eq!(log.verify_chain().await.unwrap(), N as u64);

                store.tamper(target, |entry| {
                    let hash: &mut ChainHash = match field {
                        "entry_hash" => &mut entry.entry_hash,
                        _ => &mut entry.payload_digest,
                    };
                    hash.0[0] ^= 1;
                });

                assert_eq!(
                    log.verify_chain().await,
                    Err(AuditError::ChainIntegrityViolation {
                        at_sequence: target
                    }),
                    "flipping {field} at {target}"
                );
            }
        }
    }

    // =============================================================================
    // INTEGRITY HALT
    // =============================================================================

    #[tokio::test]
    async fn test_halt_blocks_requests_until_cleared() {
        let h = gate_harness(CoreScript::Immediate(Decision::Allow));
        h.gate.authorize(action("u1")).await.unwrap();

        h.store.tamper(1, |entry| entry.payload_digest.0[31] ^= 0x40);
        assert!(h.audit.verify_chain().await.is_err());
        assert_eq!(h.audit.halted_at(), Some(1));

        let err = h.gate.begin(action("u2")).await.unwrap_err();
        assert!(matches!(
            err,
            GateError::Audit(AuditError::Halted { at_sequence: 1 })
        ));
        assert_eq!(err.error_code(), "CHAIN_INTEGRITY_VIOLATION");
        assert!(GatewayError::from(err).is_fatal());

        let cleared = h.audit.clear_integrity_halt("ops-oncall").await.unwrap();
        assert_eq!(cleared.event_type(), "INTEGRITY_HALT_CLEARED");

        let outcome = h.gate.authorize(action("u2")).await.unwrap();
        assert_eq!(outcome.state(), AuthorizationState::Allowed);
        assert_eq!(h.audit.summary().counts["INTEGRITY_HALT_CLEARED"], 1);
    }

    #[tokio::test]
    async fn test_tampered_file_halts_gateway_on_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let secret = SharedSecret::generate();
        let config = GatewayConfig {
            shared_secret: Some(secret.clone()),
            audit_path: Some(path.clone()),
            ..GatewayConfig::default()
        };

        let gateway = TrustGateway::start(config.clone()).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(shared_types::SystemClock);
        CoreStub::new(
            Arc::clone(gateway.channel()),
            secret,
            clock,
            CoreScript::Immediate(Decision::Allow),
        )
        .spawn();
        let outcome = gateway.authorize_raw(&u1_restrict_draft()).await.unwrap();
        assert_eq!(outcome.state(), AuthorizationState::Allowed);
        gateway.shutdown().await;

        // Rewrite history: the ALLOW becomes a DENY.
        let stored = std::fs::read_to_string(&path).unwrap();
        assert!(stored.contains("\"REQUEST_ALLOWED\""));
        std::fs::write(&path, stored.replace("\"REQUEST_ALLOWED\"", "\"REQUEST_DENIED\"")).unwrap();

        let reopened = TrustGateway::start(config).unwrap();
        assert_eq!(reopened.state(), GatewayState::HaltedAwaitingIntervention);
        assert_eq!(reopened.audit().halted_at(), Some(1));

        let err = reopened.authorize_raw(&u1_restrict_draft()).await.unwrap_err();
        assert_eq!(err.error_code(), "CHAIN_INTEGRITY_VIOLATION");

        reopened.clear_integrity_halt("ops-oncall").await.unwrap();
        assert_eq!(reopened.state(), GatewayState::Running);
    }

    #[tokio::test]
    async fn test_schema_violation_leaves_chain_untouched() {
        let t = TestGateway::start(10);
        let err = t
            .gateway
            .submit(&serde_json::json!({ "subject_id": "u1" }))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_VIOLATION");
        // Schema violations have no chain effect.
        assert_eq!(t.gateway.audit().summary().total_entries, 0);
    }
}
