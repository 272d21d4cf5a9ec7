//! # Security Errors

use shared_bus::ReplayError;
use shared_types::{GatewayError, MacError};
use thiserror::Error;

/// Errors that can occur while signing or verifying a signal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityError {
    /// Recomputed MAC does not match the signature.
    #[error("signature invalid")]
    SignatureInvalid,

    /// Signal older than its ttl, or stamped beyond the allowed future skew.
    /// A negative `age` means the timestamp is in the future.
    #[error("signal expired: age {age}s, ttl {ttl}s")]
    TtlExpired { age: i64, ttl: u64 },

    /// `(subject_id, nonce)` already accepted inside the replay window.
    #[error("replay detected: nonce {nonce_prefix}..")]
    ReplayDetected { nonce_prefix: String },

    /// Replay cache has no room for another live entry.
    #[error("replay cache full ({capacity} live entries)")]
    ReplayCacheFull { capacity: usize },

    /// Canonical encoding failed.
    #[error("canonical encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Mac(#[from] MacError),
}

impl SecurityError {
    /// Stable opaque code.
    pub fn error_code(&self) -> &'static str {
        match self {
            SecurityError::SignatureInvalid => "SIGNATURE_INVALID",
            SecurityError::TtlExpired { .. } => "TTL_EXPIRED",
            SecurityError::ReplayDetected { .. } => "REPLAY_DETECTED",
            SecurityError::ReplayCacheFull { .. } => "OVERLOADED",
            SecurityError::Encoding(_) | SecurityError::Mac(_) => "INTERNAL",
        }
    }
}

impl From<ReplayError> for SecurityError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::Replayed { nonce_prefix } => SecurityError::ReplayDetected { nonce_prefix },
            ReplayError::CapacityExhausted { capacity } => SecurityError::ReplayCacheFull { capacity },
        }
    }
}

impl From<SecurityError> for GatewayError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::SignatureInvalid => GatewayError::SignatureInvalid,
            SecurityError::TtlExpired { age, ttl } => GatewayError::TtlExpired { age, ttl },
            SecurityError::ReplayDetected { nonce_prefix } => {
                GatewayError::ReplayDetected { nonce_prefix }
            }
            SecurityError::ReplayCacheFull { capacity } => GatewayError::Overloaded {
                resource: "replay_cache".to_string(),
                limit: capacity,
            },
            other @ (SecurityError::Encoding(_) | SecurityError::Mac(_)) => {
                GatewayError::Internal(other.to_string())
            }
        }
    }
}
