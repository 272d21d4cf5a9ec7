//! # Authorization Flows
//!
//! Irreversible actions end to end: producer draft, signed ack request on
//! the channel, Core decision (or silence), terminal audit entry, reported
//! outcome and the effect guard.

#[cfg(test)]
mod tests {
    use crate::core_stub::CoreScript;
    use crate::integration::{advisory_draft, draft_for, u1_restrict_draft, TestGateway};
    use gateway_runtime::SubmitResult;
    use kg_04_authorization_gate::{Disposition, GateError};
    use shared_types::{
        ActionRequest, ActionType, AuthorizationState, Decision, ProductContext, SubjectId,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn action(subject: &str) -> ActionRequest {
        ActionRequest::for_action(
            SubjectId::parse(subject).unwrap(),
            ProductContext::Game,
            ActionType::Restriction,
            30,
        )
    }

    async fn wait_for_trail(t: &TestGateway, request_id: shared_types::RequestId, len: usize) {
        while t.audit_trail(request_id).len() < len {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    // =============================================================================
    // CONCRETE SCENARIOS
    // =============================================================================

    /// u1 restriction, Core answers ALLOW at +5s.
    #[tokio::test(start_paused = true)]
    async fn test_u1_allowed_at_five_seconds() {
        let t = TestGateway::start(10);
        let core = t.core(CoreScript::After(Decision::Allow, Duration::from_secs(5)));

        let started = Instant::now();
        let result = t.gateway.submit(&u1_restrict_draft()).await.unwrap();
        let elapsed = started.elapsed();

        let SubmitResult::Authorized { outcome } = result else {
            panic!("irreversible submission must be authorized, got {result:?}");
        };
        assert_eq!(outcome.state(), AuthorizationState::Allowed);
        assert_eq!(outcome.disposition(), Disposition::Applied);
        assert_eq!(outcome.action_type(), ActionType::Restriction);
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(10));
        assert_eq!(core.seen(), vec![outcome.request_id()]);
        assert_eq!(
            t.audit_trail(outcome.request_id()),
            ["REQUEST_CREATED", "REQUEST_ALLOWED"]
        );

        let applied = t
            .gateway
            .gate()
            .apply_if_allowed(&outcome, || "restricted")
            .await
            .unwrap();
        assert_eq!(applied, Some("restricted"));
        assert_eq!(
            t.audit_trail(outcome.request_id()),
            ["REQUEST_CREATED", "REQUEST_ALLOWED", "ACTION_APPLIED"]
        );
        assert!(t.gateway.verify_chain().await.is_ok());
    }

    /// Same submission, Core never answers, ack_timeout 30s.
    #[tokio::test(start_paused = true)]
    async fn test_u1_times_out_without_decision() {
        let t = TestGateway::start(30);
        let core = t.core(CoreScript::Silent);

        let started = Instant::now();
        let outcome = t.gateway.authorize_raw(&u1_restrict_draft()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome.state(), AuthorizationState::TimedOut);
        assert_eq!(outcome.disposition(), Disposition::NoOp);
        assert!(elapsed >= Duration::from_secs(30) && elapsed <= Duration::from_secs(31));
        assert_eq!(core.seen().len(), 1);

        let effect_ran = AtomicBool::new(false);
        let applied = t
            .gateway
            .gate()
            .apply_if_allowed(&outcome, || effect_ran.store(true, Ordering::SeqCst))
            .await
            .unwrap();
        assert!(applied.is_none());
        assert!(!effect_ran.load(Ordering::SeqCst));
        assert_eq!(
            t.audit_trail(outcome.request_id()),
            ["REQUEST_CREATED", "REQUEST_TIMED_OUT"]
        );
        assert_eq!(t.gateway.summary().pending_requests, 0);
    }

    // =============================================================================
    // RESOLUTION GUARANTEES
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_late_allow_after_timeout_is_ignored() {
        let t = TestGateway::start(5);
        let _core = t.core(CoreScript::Silent);

        let outcome = t.gateway.authorize_raw(&u1_restrict_draft()).await.unwrap();
        assert_eq!(outcome.state(), AuthorizationState::TimedOut);

        assert!(t.decide(outcome.request_id(), Decision::Allow).await > 0);
        wait_for_trail(&t, outcome.request_id(), 3).await;

        assert_eq!(
            t.audit_trail(outcome.request_id()),
            ["REQUEST_CREATED", "REQUEST_TIMED_OUT", "LATE_DECISION_IGNORED"]
        );
        let record = t.gateway.gate().request(&outcome.request_id()).unwrap();
        assert_eq!(record.state(), AuthorizationState::TimedOut);
        assert!(!record.applied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deny_is_never_applied_and_audited_once() {
        let t = TestGateway::start(10);
        let _core = t.core(CoreScript::Immediate(Decision::Deny));

        let outcome = t.gateway.authorize_raw(&u1_restrict_draft()).await.unwrap();
        assert_eq!(outcome.state(), AuthorizationState::Denied);
        assert_eq!(outcome.disposition(), Disposition::Discarded);

        let effect_ran = AtomicBool::new(false);
        let applied = t
            .gateway
            .gate()
            .apply_if_allowed(&outcome, || effect_ran.store(true, Ordering::SeqCst))
            .await
            .unwrap();
        assert!(applied.is_none());
        assert!(!effect_ran.load(Ordering::SeqCst));

        // Core repeats itself; the duplicate changes nothing.
        t.decide(outcome.request_id(), Decision::Deny).await;
        t.decide(outcome.request_id(), Decision::Allow).await;
        wait_for_trail(&t, outcome.request_id(), 4).await;

        let trail = t.audit_trail(outcome.request_id());
        assert_eq!(trail.iter().filter(|e| **e == "REQUEST_DENIED").count(), 1);
        assert_eq!(
            trail.iter().filter(|e| **e == "LATE_DECISION_IGNORED").count(),
            2
        );
        assert!(!trail.contains(&"ACTION_APPLIED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_discards_and_ignores_later_allow() {
        let t = TestGateway::start(10);
        let core = t.core(CoreScript::Silent);

        let pending = t.gateway.gate().begin(action("u1")).await.unwrap();
        core.wait_for(1).await;
        assert!(pending.cancel());
        assert!(!pending.cancel());

        let request_id = pending.request_id();
        let outcome = pending.outcome().await.unwrap();
        assert_eq!(outcome.state(), AuthorizationState::Cancelled);
        assert_eq!(outcome.disposition(), Disposition::Discarded);

        t.decide(request_id, Decision::Allow).await;
        wait_for_trail(&t, request_id, 3).await;
        assert_eq!(
            t.audit_trail(request_id),
            ["REQUEST_CREATED", "REQUEST_CANCELLED", "LATE_DECISION_IGNORED"]
        );
    }

    // =============================================================================
    // CONCURRENCY AND BACKPRESSURE
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_distinct_subjects_resolve_concurrently() {
        let t = TestGateway::start(10);
        let core = t.core(CoreScript::After(Decision::Allow, Duration::from_secs(2)));

        let started = Instant::now();
        let tasks: Vec<_> = (0..5)
            .map(|i| {
                let gate = t.gateway.gate().clone();
                tokio::spawn(async move { gate.authorize(action(&format!("player-{i}"))).await })
            })
            .collect();

        for task in tasks {
            let outcome = task.await.unwrap().unwrap();
            assert_eq!(outcome.state(), AuthorizationState::Allowed);
        }
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(core.seen().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_subject_requests_are_serialized() {
        let t = TestGateway::start(10);
        let core = t.core(CoreScript::After(Decision::Allow, Duration::from_secs(2)));

        let started = Instant::now();
        let first = t.gateway.gate().begin(action("u1")).await.unwrap();
        let first_id = first.request_id();

        let gate = t.gateway.gate().clone();
        let second = tokio::spawn(async move { gate.authorize(action("u1")).await });

        assert_eq!(
            first.outcome().await.unwrap().state(),
            AuthorizationState::Allowed
        );
        let second = second.await.unwrap().unwrap();
        assert_eq!(second.state(), AuthorizationState::Allowed);

        // The second ack request is only published once the first resolved.
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert_eq!(core.seen(), vec![first_id, second.request_id()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_bound_rejects_then_recovers() {
        let t = TestGateway::start_with(|config| {
            config.ack_timeout = Duration::from_secs(10);
            config.max_pending_requests = 2;
        });
        let core = t.core(CoreScript::Silent);

        let first = t.gateway.gate().begin(action("u1")).await.unwrap();
        let _second = t.gateway.gate().begin(action("u2")).await.unwrap();

        let err = t.gateway.gate().begin(action("u3")).await.unwrap_err();
        assert!(matches!(err, GateError::Overloaded { limit: 2 }));
        assert_eq!(err.error_code(), "OVERLOADED");
        assert_eq!(
            t.gateway.audit().summary().counts.get("REQUEST_REJECTED"),
            Some(&1)
        );

        first.cancel();
        first.outcome().await.unwrap();
        let third = t.gateway.gate().begin(action("u3")).await;
        assert!(third.is_ok());
        core.wait_for(3).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_advisory_submission_is_not_gated() {
        let t = TestGateway::start(10);
        let core = t.core(CoreScript::Immediate(Decision::Allow));

        let result = t.gateway.submit(&advisory_draft("u1")).await.unwrap();
        assert!(matches!(result, SubmitResult::Published { .. }));
        assert!(core.seen().is_empty());
        assert!(!t
            .gateway
            .audit()
            .summary()
            .counts
            .contains_key("REQUEST_CREATED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_action_type_round_trips() {
        let t = TestGateway::start(10);
        let _core = t.core(CoreScript::Immediate(Decision::Allow));

        for (i, action_type) in ["death", "rebirth", "access_gating", "progression_lock", "restriction"]
            .iter()
            .enumerate()
        {
            let draft = draft_for(&format!("subject-{i}"), action_type);
            let outcome = t.gateway.authorize_raw(&draft).await.unwrap();
            assert_eq!(outcome.action_type().as_str(), *action_type);
            assert_eq!(outcome.state(), AuthorizationState::Allowed);
        }
    }
}
