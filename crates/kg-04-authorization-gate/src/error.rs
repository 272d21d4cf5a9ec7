//! Error types for the Authorization Gate.

use kg_02_security_manager::SecurityError;
use kg_03_audit_log::AuditError;
use shared_bus::ChannelError;
use shared_types::{GatewayError, SchemaViolation};
use thiserror::Error;

/// Authorization Gate errors.
///
/// Authorization outcomes (ALLOWED, DENIED, TIMED_OUT, CANCELLED) are never
/// errors; they arrive as an `AuthorizationOutcome`.
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    #[error(transparent)]
    Security(#[from] SecurityError),

    /// Decision or effect did not come through the wired channel.
    #[error("unauthorized channel: {reason}")]
    UnauthorizedChannel { reason: &'static str },

    /// Pending bound reached. Retry later.
    #[error("overloaded: {limit} requests already pending")]
    Overloaded { limit: usize },

    /// Audit append failed. While the log is halted nothing is authorized.
    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The effect of this request was already applied once.
    #[error("effect already applied")]
    AlreadyApplied,

    /// The resolution task ended without reporting.
    #[error("authorization outcome lost")]
    OutcomeLost,
}

impl GateError {
    /// Stable opaque code.
    pub fn error_code(&self) -> &'static str {
        match self {
            GateError::Schema(_) => "SCHEMA_VIOLATION",
            GateError::Security(err) => err.error_code(),
            GateError::UnauthorizedChannel { .. } => "UNAUTHORIZED_CHANNEL",
            GateError::Overloaded { .. } => "OVERLOADED",
            GateError::Audit(err) => err.error_code(),
            GateError::Channel(_) | GateError::AlreadyApplied
            | GateError::OutcomeLost => "INTERNAL",
        }
    }
}

impl From<GateError> for GatewayError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Schema(violation) => GatewayError::SchemaViolation(violation),
            GateError::Security(err) => err.into(),
            GateError::UnauthorizedChannel { reason } => GatewayError::UnauthorizedChannel {
                reason: reason.to_string(),
            },
            GateError::Overloaded { limit } => GatewayError::Overloaded {
                resource: "pending_requests".to_string(),
                limit,
            },
            GateError::Audit(err) => err.into(),
            other => GatewayError::Internal(other.to_string()),
        }
    }
}
