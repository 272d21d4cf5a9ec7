//! # Error Types
//!
//! The gateway-wide error taxonomy and the schema violation raised at the
//! validation boundary. Subsystem crates define their own error enums and
//! convert into [`GatewayError`] when a failure leaves the subsystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What is wrong with a single envelope field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldProblem {
    /// Required field is absent (or null).
    Missing,
    /// JSON type does not match (e.g. string where a number is expected).
    WrongType,
    /// Value is not a member of the closed enumeration.
    UnknownVariant,
    /// Numeric value outside its allowed range.
    OutOfRange,
    /// Value does not match the required textual format.
    InvalidFormat,
    Empty,
    TooLong,
    /// Field is not part of the fixed envelope.
    UnexpectedField,
    /// Field contradicts another field.
    Inconsistent,
    /// Input is not a JSON object at all.
    MalformedJson,
}

impl FieldProblem {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldProblem::Missing => "MISSING",
            FieldProblem::WrongType => "WRONG_TYPE",
            FieldProblem::UnknownVariant => "UNKNOWN_VARIANT",
            FieldProblem::OutOfRange => "OUT_OF_RANGE",
            FieldProblem::InvalidFormat => "INVALID_FORMAT",
            FieldProblem::Empty => "EMPTY",
            FieldProblem::TooLong => "TOO_LONG",
            FieldProblem::UnexpectedField => "UNEXPECTED_FIELD",
            FieldProblem::Inconsistent => "INCONSISTENT",
            FieldProblem::MalformedJson => "MALFORMED_JSON",
        }
    }
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed envelope. Raised before anything else touches a message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("schema violation: field `{field}` {problem}")]
pub struct SchemaViolation {
    pub field: String,
    pub problem: FieldProblem,
}

impl SchemaViolation {
    pub fn new(field: impl Into<String>, problem: FieldProblem) -> Self {
        Self {
            field: field.into(),
            problem,
        }
    }

    /// Placeholder field name used when the input is not an object.
    pub fn malformed() -> Self {
        Self::new("$", FieldProblem::MalformedJson)
    }
}

/// Gateway-wide error taxonomy.
///
/// Every variant maps to one stable opaque code (see [`Self::error_code`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Malformed envelope. Rejected with no cache or chain effect.
    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),

    /// Forged or corrupted signal.
    #[error("signature invalid")]
    SignatureInvalid,

    /// Signal is older than its ttl, or stamped too far in the future.
    #[error("signal expired: age {age}s exceeds ttl {ttl}s")]
    TtlExpired { age: i64, ttl: u64 },

    /// Duplicate nonce inside the replay window.
    #[error("replay detected: nonce {nonce_prefix}.. already accepted")]
    ReplayDetected { nonce_prefix: String },

    /// Attempt to reach an internal path without going through the channel.
    #[error("unauthorized channel: {reason}")]
    UnauthorizedChannel { reason: String },

    /// No decision before the deadline.
    #[error("authorization timed out for request {request_id}")]
    AuthorizationTimeout { request_id: String },

    /// Too many pending requests, or a bounded internal resource is full.
    #[error("overloaded: {resource} at capacity {limit}")]
    Overloaded { resource: String, limit: usize },

    /// Audit tamper detected. Halts every further audited decision.
    #[error("audit chain integrity violation at sequence {at_sequence}")]
    ChainIntegrityViolation { at_sequence: u64 },

    /// Infrastructure failure (I/O, closed task) that is none of the above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable opaque code for logs, metrics labels and wire responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::SchemaViolation(_) => "SCHEMA_VIOLATION",
            GatewayError::SignatureInvalid => "SIGNATURE_INVALID",
            GatewayError::TtlExpired { .. } => "TTL_EXPIRED",
            GatewayError::ReplayDetected { .. } => "REPLAY_DETECTED",
            GatewayError::UnauthorizedChannel { .. } => "UNAUTHORIZED_CHANNEL",
            GatewayError::AuthorizationTimeout { .. } => "AUTHORIZATION_TIMEOUT",
            GatewayError::Overloaded { .. } => "OVERLOADED",
            GatewayError::ChainIntegrityViolation { .. } => "CHAIN_INTEGRITY_VIOLATION",
            GatewayError::Internal(_) => "INTERNAL",
        }
    }

    /// Security events are logged at warn level and counted separately.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            GatewayError::SignatureInvalid
                | GatewayError::ReplayDetected { .. }
                | GatewayError::UnauthorizedChannel { .. }
                | GatewayError::ChainIntegrityViolation { .. }
        )
    }

    /// The only error that degrades the whole gateway rather than a request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::ChainIntegrityViolation { .. })
    }
}

/// Operational state of the gateway as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayState {
    /// Normal operation.
    Running,
    /// Audit chain failed verification; awaiting manual intervention.
    HaltedAwaitingIntervention,
}
