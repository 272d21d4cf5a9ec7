//! # Security Flows
//!
//! Signing and verification across the validator boundary: replay window,
//! tamper detection on every signed field, TTL and clock skew.

#[cfg(test)]
mod tests {
    use crate::integration::T0;
    use kg_01_signal_validator::SignalValidator;
    use kg_02_security_manager::{SecurityError, SecurityManager, SignalSecurity};
    use shared_bus::ReplayCache;
    use shared_types::{
        Clock, ManualClock, Nonce, ProductContext, ReasonCode, SharedSecret, Signal,
        SignalDraft, SignalEnvelope, SignalKind, SignatureTag, SubjectId,
    };
    use std::sync::Arc;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn manager(secret: SharedSecret, window_secs: u64) -> (Arc<ManualClock>, SecurityManager) {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = Arc::new(ReplayCache::new(
            1_000,
            window_secs,
            clock.clone() as Arc<dyn Clock>,
        ));
        let manager = SecurityManager::new(secret, cache, clock.clone());
        (clock, manager)
    }

    fn draft(ttl: u64) -> SignalDraft {
        SignalDraft {
            subject_id: SubjectId::parse("u1").unwrap(),
            context: ProductContext::Game,
            kind: SignalKind::Restrict,
            severity: 0.8,
            reason_code: ReasonCode::parse("CHEAT_DETECTED_001").unwrap(),
            ttl,
            requires_ack: true,
        }
    }

    fn mutated(signal: &Signal, edit: impl FnOnce(&mut SignalEnvelope)) -> Signal {
        let mut envelope = signal.to_envelope();
        edit(&mut envelope);
        envelope.into_signal()
    }

    // =============================================================================
    // REPLAY
    // =============================================================================

    #[test]
    fn test_replay_rejected_inside_window_then_reusable() {
        let (clock, manager) = manager(SharedSecret::generate(), 10);
        let signal = manager.sign(&draft(10)).unwrap();

        manager.verify(&signal).unwrap();
        clock.advance(3);
        assert!(matches!(
            manager.verify(&signal),
            Err(SecurityError::ReplayDetected { .. })
        ));
        assert_eq!(manager.summary().replay_attempts, 1);

        // Window elapsed: the same (subject, nonce) pair is accepted again.
        clock.set(T0 + 11);
        let reissued = manager
            .sign_with_nonce(&draft(10), *signal.nonce(), clock.now_secs())
            .unwrap();
        assert_eq!(reissued.nonce(), signal.nonce());
        manager.verify(&reissued).unwrap();
    }

    #[test]
    fn test_same_nonce_for_other_subject_is_not_a_replay() {
        let (_clock, manager) = manager(SharedSecret::generate(), 60);
        let nonce = Nonce::from_bytes([7; Nonce::LEN]);
        let mut other = draft(30);
        other.subject_id = SubjectId::parse("u2").unwrap();

        let a = manager.sign_with_nonce(&draft(30), nonce, T0).unwrap();
        let b = manager.sign_with_nonce(&other, nonce, T0).unwrap();
        manager.verify(&a).unwrap();
        manager.verify(&b).unwrap();
    }

    // =============================================================================
    // TAMPER DETECTION
    // =============================================================================

    #[test]
    fn test_any_signed_field_mutation_is_rejected() {
        let (_clock, manager) = manager(SharedSecret::generate(), 60);
        let signal = manager.sign(&draft(30)).unwrap();

        let mutations: Vec<(&str, Box<dyn Fn(&mut SignalEnvelope)>)> = vec![
            ("subject_id", Box::new(|e: &mut SignalEnvelope| e.subject_id = SubjectId::parse("u0").unwrap())),
            ("context", Box::new(|e: &mut SignalEnvelope| e.context = ProductContext::Finance)),
            ("kind", Box::new(|e: &mut SignalEnvelope| e.kind = SignalKind::Escalate)),
            ("severity", Box::new(|e: &mut SignalEnvelope| e.severity = f64::from_bits(e.severity.to_bits() ^ 1))),
            (
                "reason_code",
                Box::new(|e: &mut SignalEnvelope| e.reason_code = ReasonCode::parse("CHEAT_DETECTED_000").unwrap()),
            ),
            ("ttl", Box::new(|e: &mut SignalEnvelope| e.ttl ^= 1)),
            ("requires_ack", Box::new(|e: &mut SignalEnvelope| e.requires_ack = !e.requires_ack)),
            (
                "nonce",
                Box::new(|e: &mut SignalEnvelope| {
                    let mut bytes = *e.nonce.as_bytes();
                    bytes[Nonce::LEN - 1] ^= 0x80;
                    e.nonce = Nonce::from_bytes(bytes);
                }),
            ),
            ("created_at", Box::new(|e: &mut SignalEnvelope| e.created_at ^= 1)),
        ];

        for (field, mutation) in &mutations {
            let forged = mutated(&signal, |e| mutation(e));
            assert_eq!(
                manager.verify(&forged),
                Err(SecurityError::SignatureInvalid),
                "mutating {field} must break the signature"
            );
        }

        for byte in 0..signal.signature().as_bytes().len() {
            let forged = mutated(&signal, |e| {
                let mut tag = e.signature.as_bytes().to_vec();
                tag[byte] ^= 1;
                e.signature = SignatureTag::new(tag);
            });
            assert_eq!(manager.verify(&forged), Err(SecurityError::SignatureInvalid));
        }

        // Rejections left no replay entry behind.
        manager.verify(&signal).unwrap();
        assert_eq!(
            manager.summary().rejected_total,
            (mutations.len() + signal.signature().as_bytes().len()) as u64
        );
    }

    #[test]
    fn test_other_secret_rejects() {
        let (_clock, signer) = manager(SharedSecret::generate(), 60);
        let (_clock, verifier) = manager(SharedSecret::generate(), 60);
        let signal = signer.sign(&draft(30)).unwrap();
        assert_eq!(verifier.verify(&signal), Err(SecurityError::SignatureInvalid));
    }

    #[test]
    fn test_wire_envelope_survives_validation_but_not_tampering() {
        let (_clock, manager) = manager(SharedSecret::generate(), 60);
        let validator = SignalValidator::default();
        let signal = manager.sign(&draft(30)).unwrap();

        let wire = serde_json::to_value(signal.to_envelope()).unwrap();
        let decoded = validator.validate(&wire).unwrap();
        assert_eq!(decoded, signal);

        let mut tampered = wire.clone();
        tampered["severity"] = serde_json::json!(0.81);
        let forged = validator.validate(&tampered).unwrap();
        assert_eq!(manager.verify(&forged), Err(SecurityError::SignatureInvalid));

        manager.verify(&decoded).unwrap();
    }

    // =============================================================================
    // FRESHNESS
    // =============================================================================

    #[test]
    fn test_ttl_five_accepted_at_four_expired_at_six() {
        let (clock, manager) = manager(SharedSecret::generate(), 60);
        let early = manager.sign(&draft(5)).unwrap();
        let late = manager.sign(&draft(5)).unwrap();

        clock.set(T0 + 4);
        manager.verify(&early).unwrap();

        clock.set(T0 + 6);
        assert_eq!(
            manager.verify(&late),
            Err(SecurityError::TtlExpired { age: 6, ttl: 5 })
        );
        assert_eq!(manager.verify(&late).unwrap_err().error_code(), "TTL_EXPIRED");
    }

    #[test]
    fn test_future_timestamp_beyond_skew_rejected() {
        let (_clock, manager) = manager(SharedSecret::generate(), 60);
        let within = manager
            .sign_with_nonce(&draft(30), Nonce::from_bytes([1; Nonce::LEN]), T0 + 10)
            .unwrap();
        let beyond = manager
            .sign_with_nonce(&draft(30), Nonce::from_bytes([2; Nonce::LEN]), T0 + 11)
            .unwrap();

        manager.verify(&within).unwrap();
        assert!(matches!(
            manager.verify(&beyond),
            Err(SecurityError::TtlExpired { age: -11, .. })
        ));
    }
}
