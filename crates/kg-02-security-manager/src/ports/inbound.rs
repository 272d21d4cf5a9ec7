//! # Inbound Ports (Driving Ports / API)
//!
//! The Security Manager's public contract. Implementations must be
//! thread-safe (`Send + Sync`).

use crate::domain::SecurityError;
use crate::service::SecuritySummary;
use shared_types::{Signal, SignalDraft};

/// Signing and verification of signals.
pub trait SignalSecurity: Send + Sync {
    /// Assign a fresh nonce and `created_at`, then sign.
    ///
    /// Never mutates the caller's draft.
    fn sign(&self, draft: &SignalDraft) -> Result<Signal, SecurityError>;

    /// Signature, then TTL, then replay.
    ///
    /// Side-effect-free on failure; on success the `(subject_id, nonce)`
    /// pair is recorded in the replay cache.
    fn verify(&self, signal: &Signal) -> Result<(), SecurityError>;

    /// Counters and replay cache size.
    fn summary(&self) -> SecuritySummary;
}
