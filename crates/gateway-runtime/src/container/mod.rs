//! # Gateway Container
//!
//! Owns every subsystem and wires them to one in-memory channel.
//!
//! ## Initialization Order
//!
//! 1. Clock, replay cache (with its sweeper) and Security Manager
//! 2. Channel
//! 3. Audit log: open the store and verify the stored chain
//! 4. Authorization Gate and its decision listener
//! 5. Signal ingress
//!
//! A stored chain that fails verification does not abort startup. The
//! gateway comes up in `HALTED_AWAITING_INTERVENTION` and refuses every
//! audited decision until an operator clears the halt.

pub mod config;

pub use config::{AuditHasherKind, ConfigError, GatewayConfig};

use kg_01_signal_validator::{SignalValidator, Submission, ValidatorConfig};
use kg_02_security_manager::{SecurityManager, SecuritySummary, SignalSecurity};
use kg_03_audit_log::{
    AuditEntry, AuditError, AuditLog, AuditResult, AuditStore, AuditSummary, ChainHasher,
    FileAuditStore, InMemoryAuditStore, Sha256Hasher, Sha3Hasher,
};
use kg_04_authorization_gate::{
    AuthorizationGate, AuthorizationOutcome, GateConfig, GateError, SignalIngress,
};
use serde::Serialize;
use serde_json::Value;
use shared_bus::{ChannelGateway, EventFilter, EventTopic, GatewayEvent, InMemoryChannel, ReplayCache};
use shared_types::{
    ActionRequest, Clock, FieldProblem, GatewayState, OperatingMode, SchemaViolation,
    SignalEnvelope, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often expired nonces are dropped from the replay cache.
pub const REPLAY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("audit log unavailable: {0}")]
    Audit(#[from] AuditError),
}

/// Result of a producer submission.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitResult {
    /// Advisory signal signed and put on the channel.
    Published { signal: SignalEnvelope },
    /// Irreversible action resolved by the gate.
    Authorized { outcome: AuthorizationOutcome },
}

/// Operator view of the whole gateway.
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySummary {
    pub state: GatewayState,
    pub mode: OperatingMode,
    pub security: SecuritySummary,
    pub audit: AuditSummary,
    pub pending_requests: usize,
    pub events_published: u64,
}

/// The running gateway.
pub struct TrustGateway {
    config: GatewayConfig,
    validator: SignalValidator,
    security: Arc<SecurityManager>,
    channel: Arc<InMemoryChannel>,
    audit: AuditLog,
    gate: AuthorizationGate,
    shutdown: watch::Sender<bool>,
    sweeper: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl TrustGateway {
    /// Wire and start every subsystem. Must be called inside a Tokio runtime.
    pub fn start(config: GatewayConfig) -> Result<Self, StartupError> {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    /// Same as [`Self::start`] with an injected wall clock.
    pub fn start_with_clock(
        config: GatewayConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StartupError> {
        config.validate()?;
        let secret = config
            .shared_secret
            .clone()
            .ok_or(ConfigError::MissingSecret)?;

        let replay_cache = Arc::new(ReplayCache::new(
            config.replay_cache_capacity,
            config.replay_window_secs,
            Arc::clone(&clock),
        ));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let sweeper =
            Arc::clone(&replay_cache).spawn_sweeper(REPLAY_SWEEP_INTERVAL, shutdown_rx);
        let security = Arc::new(SecurityManager::new(
            secret,
            replay_cache,
            Arc::clone(&clock),
        ));

        let channel = Arc::new(InMemoryChannel::new());

        let store: Arc<dyn AuditStore> = match &config.audit_path {
            Some(path) => Arc::new(FileAuditStore::open(path)?),
            None => Arc::new(InMemoryAuditStore::new()),
        };
        let hasher: Arc<dyn ChainHasher> = match config.audit_hasher {
            AuditHasherKind::Sha256 => Arc::new(Sha256Hasher),
            AuditHasherKind::Sha3_256 => Arc::new(Sha3Hasher),
        };
        let audit = AuditLog::open(store, hasher, Arc::clone(&clock))?;
        if let Some(at_sequence) = audit.halted_at() {
            warn!(
                at_sequence,
                "Audit chain failed verification at startup; gateway is HALTED_AWAITING_INTERVENTION"
            );
        }

        let validator = SignalValidator::new(ValidatorConfig {
            max_signal_ttl: config.max_signal_ttl,
        });
        let gate = AuthorizationGate::new(
            GateConfig {
                ack_timeout: config.ack_timeout,
                max_pending_requests: config.max_pending_requests,
                archive_capacity: config.archive_capacity,
                operating_mode: config.operating_mode,
            },
            validator.clone(),
            Arc::clone(&security) as Arc<dyn SignalSecurity>,
            Arc::clone(&channel) as Arc<dyn ChannelGateway>,
            audit.clone(),
            clock,
        );

        let listener =
            gate.spawn_decision_listener(channel.subscribe(EventFilter::topics(vec![
                EventTopic::Decisions,
            ])));

        let ingress = SignalIngress::new(
            Arc::clone(&security) as Arc<dyn SignalSecurity>,
            audit.clone(),
            channel.channel_id(),
        );
        let signals = channel.subscribe(EventFilter::topics(vec![EventTopic::Signals]));
        let ingress_task = tokio::spawn(async move {
            let accepted = ingress.run(signals).await;
            debug!(accepted, "Signal ingress stopped");
        });

        info!(
            mode = %config.operating_mode,
            ack_timeout_secs = config.ack_timeout.as_secs(),
            replay_window_secs = config.replay_window_secs,
            audit_path = ?config.audit_path,
            "Trust gateway started"
        );

        Ok(Self {
            config,
            validator,
            security,
            channel,
            audit,
            gate,
            shutdown,
            sweeper,
            tasks: vec![listener, ingress_task],
        })
    }

    /// Validate a producer draft and route it.
    ///
    /// Advisory signals are signed and published. Irreversible actions wait
    /// for the gate's outcome.
    pub async fn submit(&self, raw: &Value) -> Result<SubmitResult, GateError> {
        match self.validator.validate_draft(raw)? {
            Submission::Advisory(draft) => {
                let signal = self.security.sign(&draft)?;
                let envelope = signal.to_envelope();
                let receivers = self
                    .channel
                    .publish(GatewayEvent::SignalPublished(signal))
                    .await;
                debug!(receivers, subject = %draft.subject_id, "Advisory signal published");
                Ok(SubmitResult::Published { signal: envelope })
            }
            Submission::Irreversible(request) => Ok(SubmitResult::Authorized {
                outcome: self.gate.authorize(request).await?,
            }),
        }
    }

    /// Authorize one irreversible action. Rejects advisory drafts.
    pub async fn authorize_raw(&self, raw: &Value) -> Result<AuthorizationOutcome, GateError> {
        match self.validator.validate_draft(raw)? {
            Submission::Irreversible(request) => self.gate.authorize(request).await,
            Submission::Advisory(_) => Err(GateError::Schema(SchemaViolation::new(
                "requires_ack",
                FieldProblem::Inconsistent,
            ))),
        }
    }

    pub async fn authorize(&self, request: ActionRequest) -> Result<AuthorizationOutcome, GateError> {
        self.gate.authorize(request).await
    }

    /// Put a Core decision on the channel. Returns the receiver count.
    pub async fn publish_decision(&self, raw: &Value) -> Result<usize, SchemaViolation> {
        let decision = self.validator.validate_decision(raw)?;
        Ok(self
            .channel
            .publish(GatewayEvent::DecisionIssued(decision))
            .await)
    }

    pub async fn verify_chain(&self) -> AuditResult<u64> {
        self.audit.verify_chain().await
    }

    pub fn export(&self) -> AuditResult<Vec<AuditEntry>> {
        self.audit.export()
    }

    pub async fn clear_integrity_halt(&self, operator: &str) -> AuditResult<AuditEntry> {
        self.audit.clear_integrity_halt(operator).await
    }

    pub fn state(&self) -> GatewayState {
        if self.audit.is_halted() {
            GatewayState::HaltedAwaitingIntervention
        } else {
            GatewayState::Running
        }
    }

    pub fn summary(&self) -> GatewaySummary {
        GatewaySummary {
            state: self.state(),
            mode: self.config.operating_mode,
            security: self.security.summary(),
            audit: self.audit.summary(),
            pending_requests: self.gate.pending_count(),
            events_published: self.channel.events_published(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<InMemoryChannel> {
        &self.channel
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Stop background tasks. Pending requests resolve as their tasks end.
    ///
    /// The sweeper stops on the shutdown signal; channel consumers are
    /// aborted.
    pub async fn shutdown(self) {
        if self.shutdown.send(true).is_err() {
            debug!("Sweeper already stopped");
        }
        for task in &self.tasks {
            task.abort();
        }
        if let Err(e) = self.sweeper.await {
            warn!(error = %e, "Replay sweeper ended abnormally");
        }
        info!(
            pending = self.gate.pending_count(),
            entries = self.audit.summary().total_entries,
            "Trust gateway stopped"
        );
    }
}
