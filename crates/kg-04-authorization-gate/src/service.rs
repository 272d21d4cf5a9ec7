//! # Authorization Gate Service
//!
//! Per-request state machine for irreversible actions.
//!
//! ```text
//! begin() ──sign──→ audit REQUEST_CREATED ──→ publish AckRequested
//!                                │
//!            ┌───────────────────┴────────────────────┐
//!            │ resolution task: decision vs deadline  │
//!            └───────────────────┬────────────────────┘
//!                  audit terminal entry ──→ report outcome
//! ```
//!
//! ## Guarantees
//!
//! - Every transition is in the audit log before the caller observes it
//! - Exactly one terminal transition per request (see `PendingRegistry`)
//! - The deadline is hard: a decision arriving after it is ignored
//! - Decisions are accepted only with a stamp from the wired channel

use crate::domain::{
    AuthorizationRequest, Claim, PendingRegistry, RequestArchive, Resolution, SubjectSequencer,
    SubjectTurn,
};
use crate::error::GateError;
use crate::ipc::DecisionHandler;
use crate::outcome::AuthorizationOutcome;
use gateway_telemetry::{AUTHORIZATION_OUTCOMES, PENDING_REQUESTS, UNAUTHORIZED_CHANNEL};
use kg_01_signal_validator::SignalValidator;
use kg_02_security_manager::SignalSecurity;
use kg_03_audit_log::{AuditError, AuditEvent, AuditLog};
use serde::Serialize;
use shared_bus::{ChannelGateway, ChannelStamp, GatewayEvent, Subscription};
use shared_types::{
    ActionRequest, ActionType, AuthorizationState, Clock, DecisionEnvelope, FieldProblem,
    OperatingMode, RequestId, SchemaViolation, SignalDraft,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Default bounded wait for Core's decision.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on simultaneously pending requests.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 1024;

/// Default number of resolved requests kept for lookups.
pub const DEFAULT_ARCHIVE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    pub ack_timeout: Duration,
    pub max_pending_requests: usize,
    pub archive_capacity: usize,
    pub operating_mode: OperatingMode,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
            archive_capacity: DEFAULT_ARCHIVE_CAPACITY,
            operating_mode: OperatingMode::ConstraintOnly,
        }
    }
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Delivered by a channel. Only the channel can mint the stamp.
    Channel(ChannelStamp),
    /// Anything else, e.g. an in-process call.
    Direct,
}

/// Effect of one delivered decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Delivery {
    /// The decision resolved a pending request.
    Resolved {
        request_id: RequestId,
        state: AuthorizationState,
    },
    /// Logged as `LATE_DECISION_IGNORED`; nothing changed.
    Ignored {
        request_id: RequestId,
        reason: &'static str,
    },
}

fn late_reason(state: AuthorizationState) -> &'static str {
    match state {
        AuthorizationState::Allowed => "ALREADY_ALLOWED",
        AuthorizationState::Denied => "ALREADY_DENIED",
        AuthorizationState::TimedOut => "ALREADY_TIMED_OUT",
        AuthorizationState::Cancelled => "ALREADY_CANCELLED",
        AuthorizationState::Pending => "UNKNOWN_REQUEST",
    }
}

type OutcomeReport = Result<AuthorizationOutcome, GateError>;

struct GateInner {
    config: GateConfig,
    validator: SignalValidator,
    security: Arc<dyn SignalSecurity>,
    channel: Arc<dyn ChannelGateway>,
    audit: AuditLog,
    clock: Arc<dyn Clock>,
    registry: Arc<PendingRegistry>,
    sequencer: SubjectSequencer,
    archive: RequestArchive,
}

/// The Authorization Gate. Cheap to clone.
#[derive(Clone)]
pub struct AuthorizationGate {
    inner: Arc<GateInner>,
}

impl AuthorizationGate {
    pub fn new(
        config: GateConfig,
        validator: SignalValidator,
        security: Arc<dyn SignalSecurity>,
        channel: Arc<dyn ChannelGateway>,
        audit: AuditLog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            mode = %config.operating_mode,
            ack_timeout_ms = config.ack_timeout.as_millis() as u64,
            max_pending = config.max_pending_requests,
            "Authorization gate created"
        );
        Self {
            inner: Arc::new(GateInner {
                registry: Arc::new(PendingRegistry::new(config.max_pending_requests)),
                archive: RequestArchive::new(config.archive_capacity),
                sequencer: SubjectSequencer::new(),
                config,
                validator,
                security,
                channel,
                audit,
                clock,
            }),
        }
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Sign the action's signal, enter PENDING and publish the
    /// must-acknowledge signal.
    ///
    /// Fails fast with [`GateError::Overloaded`] at the pending bound. Waits
    /// while an earlier request for the same subject is still pending.
    pub async fn begin(&self, request: ActionRequest) -> Result<PendingAuthorization, GateError> {
        let ActionRequest { action_type, draft } = request;
        if !draft.requires_ack {
            return Err(SchemaViolation::new("requires_ack", FieldProblem::Inconsistent).into());
        }
        self.inner.validator.check_draft(&draft)?;
        if let Some(at_sequence) = self.inner.audit.halted_at() {
            return Err(AuditError::Halted { at_sequence }.into());
        }

        let Some(reservation) = self.inner.registry.reserve() else {
            return Err(self.reject_overloaded(&draft, action_type).await);
        };
        let turn = self.inner.sequencer.acquire(&draft.subject_id).await;

        let signal = self.inner.security.sign(&draft)?;
        let request_id = RequestId::new();
        self.inner
            .audit
            .append(AuditEvent::RequestCreated {
                request_id,
                action_type,
                subject_id: draft.subject_id.clone(),
                nonce: signal.nonce().short(),
            })
            .await?;

        let record =
            AuthorizationRequest::new(request_id, action_type, signal.signal_ref(), signal.created_at());
        let deadline = Instant::now() + self.inner.config.ack_timeout;
        let decision_rx = self.inner.registry.register(record, reservation, deadline);
        PENDING_REQUESTS.inc();

        let (outcome_tx, outcome_rx) = oneshot::channel();
        tokio::spawn(resolve_request(
            Arc::clone(&self.inner),
            request_id,
            action_type,
            decision_rx,
            deadline,
            turn,
            outcome_tx,
        ));

        info!(
            request_id = %request_id,
            subject_id = %draft.subject_id,
            action_type = %action_type,
            nonce = %signal.nonce().short(),
            "Authorization request pending"
        );

        let receivers = self
            .inner
            .channel
            .publish(GatewayEvent::AckRequested {
                request_id,
                action_type,
                signal,
            })
            .await;
        if receivers == 0 {
            warn!(request_id = %request_id, "No decision maker subscribed, request will time out");
        }

        Ok(PendingAuthorization {
            request_id,
            action_type,
            registry: Arc::clone(&self.inner.registry),
            outcome: outcome_rx,
        })
    }

    /// `begin` and wait for the outcome.
    pub async fn authorize(&self, request: ActionRequest) -> Result<AuthorizationOutcome, GateError> {
        self.begin(request).await?.outcome().await
    }

    /// Run `effect` only if `outcome` is ALLOWED, recording `ACTION_APPLIED`
    /// first. Any other state returns `None` and runs nothing.
    ///
    /// If `ACTION_APPLIED` cannot be recorded the effect does not run and the
    /// outcome stays claimable.
    pub async fn apply_if_allowed<T>(
        &self,
        outcome: &AuthorizationOutcome,
        effect: impl FnOnce() -> T,
    ) -> Result<Option<T>, GateError> {
        if !outcome.is_allowed() {
            debug!(
                request_id = %outcome.request_id(),
                state = %outcome.state(),
                "Effect not applied"
            );
            return Ok(None);
        }
        if !outcome.claim_application() {
            return Err(GateError::AlreadyApplied);
        }

        let recorded = self
            .inner
            .audit
            .append(AuditEvent::ActionApplied {
                request_id: outcome.request_id(),
                action_type: outcome.action_type(),
            })
            .await;
        if let Err(err) = recorded {
            outcome.release_application();
            warn!(
                request_id = %outcome.request_id(),
                error = %err,
                "Effect withheld: application not audited"
            );
            return Err(err.into());
        }
        self.inner.archive.mark_applied(&outcome.request_id());
        info!(
            request_id = %outcome.request_id(),
            action_type = %outcome.action_type(),
            "Authorized effect applied"
        );
        Ok(Some(effect()))
    }

    // =========================================================================
    // DECISIONS
    // =========================================================================

    /// Deliver a decision. Only stamps from the wired channel are accepted.
    pub async fn deliver(
        &self,
        origin: Origin,
        decision: DecisionEnvelope,
    ) -> Result<Delivery, GateError> {
        let channel_id = self.inner.channel.channel_id();
        let rejected = match origin {
            Origin::Channel(stamp) if stamp.issued_by(channel_id) => None,
            Origin::Channel(_) => Some("FOREIGN_CHANNEL"),
            Origin::Direct => Some("DIRECT_CALL"),
        };
        if let Some(reason) = rejected {
            return Err(self
                .reject_unauthorized(Some(decision.request_id), reason)
                .await);
        }

        let request_id = decision.request_id;
        let resolution = Resolution::Decided(decision.decision);
        match self.inner.registry.resolve(&request_id, resolution) {
            Claim::Won => {
                debug!(
                    request_id = %request_id,
                    decision = %decision.decision,
                    "Decision accepted"
                );
                Ok(Delivery::Resolved {
                    request_id,
                    state: resolution.state(),
                })
            }
            Claim::AlreadyClaimed(state) => {
                self.inner.registry.settled(&request_id).await;
                self.ignore_late(&decision, late_reason(state)).await
            }
            Claim::Unknown => {
                let reason = self
                    .inner
                    .archive
                    .state_of(&request_id)
                    .map_or("UNKNOWN_REQUEST", late_reason);
                self.ignore_late(&decision, reason).await
            }
        }
    }

    /// Run the decision handler on `subscription` until the channel closes.
    pub fn spawn_decision_listener(&self, subscription: Subscription) -> JoinHandle<()> {
        tokio::spawn(DecisionHandler::new(self.clone()).run(subscription))
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Live or archived request.
    pub fn request(&self, request_id: &RequestId) -> Option<AuthorizationRequest> {
        self.inner
            .registry
            .get(request_id)
            .or_else(|| self.inner.archive.get(request_id))
    }

    pub fn pending_count(&self) -> usize {
        self.inner.registry.pending_count()
    }

    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    pub fn operating_mode(&self) -> OperatingMode {
        self.inner.config.operating_mode
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn reject_overloaded(&self, draft: &SignalDraft, action_type: ActionType) -> GateError {
        let limit = self.inner.registry.limit();
        warn!(
            subject_id = %draft.subject_id,
            action_type = %action_type,
            limit,
            "Authorization request rejected: too many pending"
        );
        let event = AuditEvent::RequestRejected {
            subject_id: draft.subject_id.clone(),
            action_type,
            reason: "OVERLOADED".to_string(),
        };
        if let Err(err) = self.inner.audit.append(event).await {
            warn!(error = %err, "Could not audit overload rejection");
        }
        GateError::Overloaded { limit }
    }

    async fn reject_unauthorized(
        &self,
        request_id: Option<RequestId>,
        reason: &'static str,
    ) -> GateError {
        UNAUTHORIZED_CHANNEL.inc();
        warn!(
            request_id = ?request_id,
            origin = reason,
            "Security event: decision outside the wired channel"
        );
        let event = AuditEvent::UnauthorizedChannel {
            request_id,
            origin: reason.to_string(),
        };
        if let Err(err) = self.inner.audit.append(event).await {
            warn!(error = %err, "Could not audit unauthorized channel attempt");
        }
        GateError::UnauthorizedChannel { reason }
    }

    async fn ignore_late(
        &self,
        decision: &DecisionEnvelope,
        reason: &'static str,
    ) -> Result<Delivery, GateError> {
        self.inner
            .audit
            .append(AuditEvent::LateDecisionIgnored {
                request_id: decision.request_id,
                decision: decision.decision,
                reason: reason.to_string(),
            })
            .await?;
        info!(
            request_id = %decision.request_id,
            decision = %decision.decision,
            reason,
            "Late decision ignored"
        );
        Ok(Delivery::Ignored {
            request_id: decision.request_id,
            reason,
        })
    }
}

impl std::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Races the decision against the deadline, audits the terminal state,
/// then reports it.
async fn resolve_request(
    inner: Arc<GateInner>,
    request_id: RequestId,
    action_type: ActionType,
    mut decision_rx: oneshot::Receiver<Resolution>,
    deadline: Instant,
    turn: SubjectTurn,
    outcome_tx: oneshot::Sender<OutcomeReport>,
) {
    let arrived = tokio::select! {
        biased;
        received = &mut decision_rx => Some(received),
        () = sleep_until(deadline) => None,
    };
    let resolution = match arrived {
        Some(Ok(resolution)) => resolution,
        Some(Err(_)) => Resolution::TimedOut,
        None => {
            // Loses to a decision that claimed the request first.
            inner.registry.resolve(&request_id, Resolution::TimedOut);
            decision_rx.await.unwrap_or(Resolution::TimedOut)
        }
    };
    let state = resolution.state();

    let audited = match AuditEvent::resolution(request_id, state) {
        Some(event) => inner.audit.append(event).await.map(|_| ()),
        None => Ok(()),
    };

    if let Some(mut record) = inner.registry.get(&request_id) {
        record.resolve(state, inner.clock.now_secs());
        inner.archive.insert(record);
    }
    inner.registry.finish(&request_id);
    PENDING_REQUESTS.dec();
    AUTHORIZATION_OUTCOMES
        .with_label_values(&[state.as_str()])
        .inc();
    drop(turn);

    let report = match audited {
        Ok(()) => {
            info!(request_id = %request_id, state = %state, "Authorization resolved");
            Ok(AuthorizationOutcome::new(request_id, action_type, state))
        }
        Err(err) => {
            error!(
                request_id = %request_id,
                state = %state,
                error = %err,
                "Terminal transition not audited, outcome withheld"
            );
            Err(GateError::Audit(err))
        }
    };
    if outcome_tx.send(report).is_err() {
        debug!(request_id = %request_id, "Outcome receiver dropped");
    }
}

/// Handle to one pending request.
#[derive(Debug)]
pub struct PendingAuthorization {
    request_id: RequestId,
    action_type: ActionType,
    registry: Arc<PendingRegistry>,
    outcome: oneshot::Receiver<OutcomeReport>,
}

impl PendingAuthorization {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    /// Cancel before resolution. Idempotent: only the first call before a
    /// decision or the deadline has any effect.
    pub fn cancel(&self) -> bool {
        let claimed = matches!(
            self.registry.resolve(&self.request_id, Resolution::Cancelled),
            Claim::Won
        );
        if claimed {
            info!(request_id = %self.request_id, "Authorization request cancelled by owner");
        }
        claimed
    }

    /// Wait for the audited terminal outcome.
    pub async fn outcome(self) -> Result<AuthorizationOutcome, GateError> {
        self.outcome.await.map_err(|_| GateError::OutcomeLost)?
    }
}
