//! # Security Manager Service
//!
//! Signs outgoing signals and verifies incoming ones.
//!
//! ## Verification Order
//!
//! ```text
//! verify(signal)
//!   ├── 1. MAC recomputed, constant-time compare ──✗──→ SignatureInvalid
//!   ├── 2. age = now - created_at > ttl          ──✗──→ TTLExpired
//!   └── 3. (subject_id, nonce) live in cache      ──✗──→ ReplayDetected
//!          otherwise insert until created_at.max(now) + ttl
//! ```
//!
//! Cheapest rejection first, and nothing is cached for an invalid signal.

use crate::domain::{check_freshness, replay_expiry, SecurityError};
use crate::ports::inbound::SignalSecurity;
use gateway_telemetry::{REPLAY_ATTEMPTS, SIGNALS_ACCEPTED, SIGNALS_REJECTED, SIGNALS_SIGNED};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use shared_bus::ReplayCache;
use shared_types::{
    canonical_bytes, Clock, HmacSha256Mac, MacAlgorithm, Nonce, SharedSecret, Signal,
    SignalDraft, SignatureTag,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Point-in-time view of the Security Manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SecuritySummary {
    pub replay_cache_size: usize,
    pub signed_total: u64,
    pub verified_total: u64,
    pub rejected_total: u64,
    pub replay_attempts: u64,
}

#[derive(Debug, Default)]
struct SecurityStats {
    signed: AtomicU64,
    verified: AtomicU64,
    rejected: AtomicU64,
    replay_attempts: AtomicU64,
}

/// Security Manager.
///
/// Holds the shared secret and the MAC primitive; the replay cache is the
/// only mutable shared state it touches.
pub struct SecurityManager {
    secret: SharedSecret,
    mac: Arc<dyn MacAlgorithm>,
    replay_cache: Arc<ReplayCache>,
    clock: Arc<dyn Clock>,
    stats: SecurityStats,
}

impl SecurityManager {
    /// Create a manager using HMAC-SHA256.
    pub fn new(secret: SharedSecret, replay_cache: Arc<ReplayCache>, clock: Arc<dyn Clock>) -> Self {
        Self::with_mac(secret, Arc::new(HmacSha256Mac), replay_cache, clock)
    }

    /// Create a manager with an explicit MAC primitive.
    pub fn with_mac(
        secret: SharedSecret,
        mac: Arc<dyn MacAlgorithm>,
        replay_cache: Arc<ReplayCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!(algorithm = mac.name(), "Security manager created");
        Self {
            secret,
            mac,
            replay_cache,
            clock,
            stats: SecurityStats::default(),
        }
    }

    /// Sign with a caller-chosen nonce and timestamp.
    ///
    /// Used by `sign` and by tests that need to reproduce a nonce.
    pub fn sign_with_nonce(
        &self,
        draft: &SignalDraft,
        nonce: Nonce,
        created_at: u64,
    ) -> Result<Signal, SecurityError> {
        let message = canonical_bytes(draft, &nonce, created_at)
            .map_err(|e| SecurityError::Encoding(e.to_string()))?;
        let tag = self.mac.tag(self.secret.expose(), &message)?;

        self.stats.signed.fetch_add(1, Ordering::Relaxed);
        SIGNALS_SIGNED.inc();
        debug!(
            subject_id = %draft.subject_id,
            nonce = %nonce.short(),
            created_at,
            "Signal signed"
        );

        Ok(Signal::from_parts(
            draft.clone(),
            nonce,
            created_at,
            SignatureTag::new(tag),
        ))
    }

    pub fn replay_cache(&self) -> &Arc<ReplayCache> {
        &self.replay_cache
    }

    pub fn mac_name(&self) -> &'static str {
        self.mac.name()
    }

    fn check_signature(&self, signal: &Signal) -> Result<(), SecurityError> {
        let message = signal
            .canonical_bytes()
            .map_err(|e| SecurityError::Encoding(e.to_string()))?;
        if self
            .mac
            .verify(self.secret.expose(), &message, signal.signature().as_bytes())?
        {
            Ok(())
        } else {
            Err(SecurityError::SignatureInvalid)
        }
    }

    fn verify_inner(&self, signal: &Signal) -> Result<(), SecurityError> {
        self.check_signature(signal)?;

        let now = self.clock.now_secs();
        check_freshness(signal.created_at(), signal.ttl(), now)?;

        let expiry = replay_expiry(signal.created_at(), signal.ttl(), now);
        self.replay_cache
            .check_and_insert(signal.subject_id(), signal.nonce(), expiry)?;
        Ok(())
    }

    fn record_rejection(&self, signal: &Signal, err: &SecurityError) {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        SIGNALS_REJECTED.with_label_values(&[err.error_code()]).inc();

        match err {
            SecurityError::ReplayDetected { .. } => {
                self.stats.replay_attempts.fetch_add(1, Ordering::Relaxed);
                REPLAY_ATTEMPTS.inc();
                warn!(
                    subject_id = %signal.subject_id(),
                    nonce = %signal.nonce().short(),
                    "Security event: replayed signal rejected"
                );
            }
            SecurityError::SignatureInvalid => {
                warn!(
                    subject_id = %signal.subject_id(),
                    nonce = %signal.nonce().short(),
                    "Security event: invalid signature"
                );
            }
            other => {
                debug!(
                    subject_id = %signal.subject_id(),
                    nonce = %signal.nonce().short(),
                    error = %other,
                    "Signal rejected"
                );
            }
        }
    }
}

impl SignalSecurity for SecurityManager {
    fn sign(&self, draft: &SignalDraft) -> Result<Signal, SecurityError> {
        let mut bytes = [0u8; Nonce::LEN];
        OsRng.fill_bytes(&mut bytes);
        self.sign_with_nonce(draft, Nonce::from_bytes(bytes), self.clock.now_secs())
    }

    fn verify(&self, signal: &Signal) -> Result<(), SecurityError> {
        match self.verify_inner(signal) {
            Ok(()) => {
                self.stats.verified.fetch_add(1, Ordering::Relaxed);
                SIGNALS_ACCEPTED.inc();
                debug!(
                    subject_id = %signal.subject_id(),
                    nonce = %signal.nonce().short(),
                    "Signal verified"
                );
                Ok(())
            }
            Err(err) => {
                self.record_rejection(signal, &err);
                Err(err)
            }
        }
    }

    fn summary(&self) -> SecuritySummary {
        SecuritySummary {
            replay_cache_size: self.replay_cache.len(),
            signed_total: self.stats.signed.load(Ordering::Relaxed),
            verified_total: self.stats.verified.load(Ordering::Relaxed),
            rejected_total: self.stats.rejected.load(Ordering::Relaxed),
            replay_attempts: self.stats.replay_attempts.load(Ordering::Relaxed),
        }
    }
}
