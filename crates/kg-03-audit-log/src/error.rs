//! Error types for the Audit Log.

use shared_types::GatewayError;
use thiserror::Error;

/// Audit Log errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    /// Stored chain failed verification at `at_sequence`.
    #[error("audit chain integrity violation at sequence {at_sequence}")]
    ChainIntegrityViolation { at_sequence: u64 },

    /// The log is halted after an integrity violation; nothing is appended
    /// until an operator clears the halt.
    #[error("audit log halted (violation at sequence {at_sequence}), awaiting intervention")]
    Halted { at_sequence: u64 },

    /// `clear_integrity_halt` called while the log is running.
    #[error("audit log is not halted")]
    NotHalted,

    #[error("audit store I/O error: {0}")]
    Io(String),

    #[error("audit serialization error: {0}")]
    Serialization(String),

    /// The single writer task is gone.
    #[error("audit writer closed")]
    WriterClosed,
}

impl AuditError {
    /// Stable opaque code.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuditError::ChainIntegrityViolation { .. } | AuditError::Halted { .. } => {
                "CHAIN_INTEGRITY_VIOLATION"
            }
            AuditError::NotHalted => "NOT_HALTED",
            AuditError::Io(_) | AuditError::Serialization(_) | AuditError::WriterClosed => {
                "INTERNAL"
            }
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        AuditError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::Serialization(err.to_string())
    }
}

impl From<AuditError> for GatewayError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::ChainIntegrityViolation { at_sequence }
            | AuditError::Halted { at_sequence } => {
                GatewayError::ChainIntegrityViolation { at_sequence }
            }
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
