//! # Signal Validator Service
//!
//! Enforces the canonical envelope schema before anything else touches a
//! message. Validation is pure: no cache, chain or channel effect.
//!
//! ## Check Order
//!
//! 1. All required fields present (and no field outside the fixed set)
//! 2. `kind`, `context`, `action_type` are members of their enumerations
//! 3. `severity ∈ [0, 1]`
//! 4. `0 < ttl <= max_signal_ttl`
//! 5. `reason_code` matches the opaque-code format
//! 6. Remaining formats (`subject_id`, `requires_ack`, `nonce`,
//!    `signature`, `created_at`)
//!
//! The first failing check is reported; nothing partially valid is returned.

use crate::domain::Fields;
use crate::ValidationResult;
use gateway_telemetry::SIGNALS_REJECTED;
use serde_json::Value;
use shared_types::{
    ActionRequest, ActionType, Decision, DecisionEnvelope, FieldProblem, Nonce, ProductContext,
    ReasonCode, RequestId, SchemaViolation, Signal, SignalDraft, SignalKind, SignatureTag,
    SubjectId, ENVELOPE_FIELDS,
};
use tracing::debug;

/// Fields a producer may send before signing.
pub const DRAFT_FIELDS: [&str; 8] = [
    "subject_id",
    "context",
    "kind",
    "severity",
    "reason_code",
    "ttl",
    "requires_ack",
    "action_type",
];

const DRAFT_REQUIRED: [&str; 7] = [
    "subject_id",
    "context",
    "kind",
    "severity",
    "reason_code",
    "ttl",
    "requires_ack",
];

/// Fields of the decision envelope.
pub const DECISION_FIELDS: [&str; 3] = ["request_id", "decision", "issued_at"];

/// Validator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorConfig {
    /// Largest accepted `ttl` (seconds). Must not exceed the replay window.
    pub max_signal_ttl: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_signal_ttl: 3600,
        }
    }
}

/// A validated producer submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// `requires_ack = false`: published without authorization.
    Advisory(SignalDraft),
    /// `requires_ack = true` with an `action_type`.
    Irreversible(ActionRequest),
}

impl Submission {
    pub fn draft(&self) -> &SignalDraft {
        match self {
            Submission::Advisory(draft) => draft,
            Submission::Irreversible(request) => &request.draft,
        }
    }
}

/// Stateless schema validator.
#[derive(Debug, Clone, Default)]
pub struct SignalValidator {
    config: ValidatorConfig,
}

impl SignalValidator {
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a signed wire envelope.
    pub fn validate(&self, raw: &Value) -> ValidationResult<Signal> {
        self.validate_envelope(raw).map_err(reject)
    }

    /// Validate a signed wire envelope from its JSON text.
    pub fn validate_str(&self, raw: &str) -> ValidationResult<Signal> {
        let value: Value =
            serde_json::from_str(raw).map_err(|_| reject(SchemaViolation::malformed()))?;
        self.validate(&value)
    }

    /// Validate an unsigned producer submission.
    ///
    /// Signing-time fields (`nonce`, `signature`, `created_at`) are rejected
    /// as unexpected. `action_type` must be present exactly when
    /// `requires_ack` is true.
    pub fn validate_draft(&self, raw: &Value) -> ValidationResult<Submission> {
        self.validate_submission(raw).map_err(reject)
    }

    /// Range checks on an already-typed draft.
    pub fn check_draft(&self, draft: &SignalDraft) -> ValidationResult<()> {
        self.check_severity(draft.severity)
            .and_then(|_| self.check_ttl(draft.ttl))
            .map_err(reject)
    }

    /// Validate a decision envelope read back from Core.
    pub fn validate_decision(&self, raw: &Value) -> ValidationResult<DecisionEnvelope> {
        Self::validate_decision_inner(raw).map_err(reject)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn validate_envelope(&self, raw: &Value) -> ValidationResult<Signal> {
        let fields = Fields::of(raw)?;
        fields.require_all(&ENVELOPE_FIELDS)?;
        fields.deny_unknown(&ENVELOPE_FIELDS)?;

        let draft = self.common_fields(&fields)?;

        let nonce: Nonce = fields.parse("nonce")?;
        let signature: SignatureTag = fields.parse("signature")?;
        let created_at = fields.u64("created_at")?;

        Ok(Signal::from_parts(draft, nonce, created_at, signature))
    }

    fn validate_submission(&self, raw: &Value) -> ValidationResult<Submission> {
        let fields = Fields::of(raw)?;
        fields.require_all(&DRAFT_REQUIRED)?;
        fields.deny_unknown(&DRAFT_FIELDS)?;

        let action_type: Option<ActionType> = if fields.contains("action_type") {
            Some(fields.parse("action_type")?)
        } else {
            None
        };

        let draft = self.common_fields(&fields)?;

        match (draft.requires_ack, action_type) {
            (true, Some(action_type)) => Ok(Submission::Irreversible(ActionRequest::new(
                action_type,
                draft,
            ))),
            (false, None) => Ok(Submission::Advisory(draft)),
            (true, None) => Err(SchemaViolation::new("action_type", FieldProblem::Missing)),
            (false, Some(_)) => Err(SchemaViolation::new(
                "requires_ack",
                FieldProblem::Inconsistent,
            )),
        }
    }

    /// Checks 2 through 6 over the fields shared by drafts and envelopes.
    fn common_fields(&self, fields: &Fields<'_>) -> ValidationResult<SignalDraft> {
        let kind: SignalKind = fields.parse("kind")?;
        let context: ProductContext = fields.parse("context")?;

        let severity = fields.f64("severity")?;
        self.check_severity(severity)?;

        let ttl = fields.u64("ttl")?;
        self.check_ttl(ttl)?;

        let reason_code = fields.parse_with("reason_code", ReasonCode::parse)?;
        let subject_id = fields.parse_with("subject_id", SubjectId::parse)?;
        let requires_ack = fields.bool("requires_ack")?;

        Ok(SignalDraft {
            subject_id,
            context,
            kind,
            severity,
            reason_code,
            ttl,
            requires_ack,
        })
    }

    fn check_severity(&self, severity: f64) -> ValidationResult<()> {
        if (0.0..=1.0).contains(&severity) {
            Ok(())
        } else {
            Err(SchemaViolation::new("severity", FieldProblem::OutOfRange))
        }
    }

    fn check_ttl(&self, ttl: u64) -> ValidationResult<()> {
        if ttl == 0 || ttl > self.config.max_signal_ttl {
            return Err(SchemaViolation::new("ttl", FieldProblem::OutOfRange));
        }
        Ok(())
    }

    fn validate_decision_inner(raw: &Value) -> ValidationResult<DecisionEnvelope> {
        let fields = Fields::of(raw)?;
        fields.require_all(&DECISION_FIELDS)?;
        fields.deny_unknown(&DECISION_FIELDS)?;

        let decision: Decision = fields.parse("decision")?;
        let request_id: RequestId = fields.parse("request_id")?;
        let issued_at = fields.u64("issued_at")?;

        Ok(DecisionEnvelope {
            request_id,
            decision,
            issued_at,
        })
    }
}

fn reject(violation: SchemaViolation) -> SchemaViolation {
    debug!(field = %violation.field, problem = %violation.problem, "Envelope rejected");
    SIGNALS_REJECTED.with_label_values(&["SCHEMA_VIOLATION"]).inc();
    violation
}
