//! # Security Primitives
//!
//! Pluggable MAC, shared-secret handling and the clock abstraction used for
//! freshness checks.
//!
//! The exact MAC primitive and key distribution are provisioned externally,
//! so the Security Manager only depends on [`MacAlgorithm`] and
//! [`SharedSecret`]. [`HmacSha256Mac`] is the default implementation.
//!
//! ## Constant-Time Verification
//!
//! [`MacAlgorithm::verify`] must compare tags in constant time. The HMAC
//! implementation delegates to `Mac::verify_slice`.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum allowed clock skew for signatures stamped in the future (seconds).
pub const MAX_FUTURE_SKEW: u64 = 10;

/// Minimum shared secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

// =============================================================================
// SHARED SECRET
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error("shared secret is not valid hex")]
    InvalidHex,
    #[error("shared secret too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },
}

/// Key material for signing and verification.
///
/// Zeroized on drop. `Debug` never prints the key.
#[derive(Clone)]
pub struct SharedSecret(Zeroizing<Vec<u8>>);

impl SharedSecret {
    pub fn new(bytes: Vec<u8>) -> Result<Self, SecretError> {
        if bytes.len() < MIN_SECRET_LEN {
            return Err(SecretError::TooShort {
                len: bytes.len(),
                min: MIN_SECRET_LEN,
            });
        }
        Ok(Self(Zeroizing::new(bytes)))
    }

    pub fn from_hex(encoded: &str) -> Result<Self, SecretError> {
        let bytes = Zeroizing::new(hex::decode(encoded.trim()).map_err(|_| SecretError::InvalidHex)?);
        Self::new(bytes.to_vec())
    }

    /// Fresh random secret, for tests and local development.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MIN_SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(Zeroizing::new(bytes))
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    /// All-zero keys are placeholders and must never reach production.
    pub fn is_weak(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED; {}])", self.0.len())
    }
}

// =============================================================================
// MAC
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacError {
    #[error("MAC key rejected by {algorithm}")]
    InvalidKey { algorithm: &'static str },
}

/// Message authentication primitive over canonical signal bytes.
pub trait MacAlgorithm: Send + Sync {
    /// Algorithm name, recorded in logs.
    fn name(&self) -> &'static str;

    /// Compute the tag for `message` under `key`.
    fn tag(&self, key: &[u8], message: &[u8]) -> Result<Vec<u8>, MacError>;

    /// Constant-time verification of `tag`.
    fn verify(&self, key: &[u8], message: &[u8], tag: &[u8]) -> Result<bool, MacError>;
}

/// HMAC-SHA256.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256Mac;

impl MacAlgorithm for HmacSha256Mac {
    fn name(&self) -> &'static str {
        "hmac-sha256"
    }

    fn tag(&self, key: &[u8], message: &[u8]) -> Result<Vec<u8>, MacError> {
        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| MacError::InvalidKey {
            algorithm: self.name(),
        })?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn verify(&self, key: &[u8], message: &[u8], tag: &[u8]) -> Result<bool, MacError> {
        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| MacError::InvalidKey {
            algorithm: self.name(),
        })?;
        mac.update(message);
        Ok(mac.verify_slice(tag).is_ok())
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Source of Unix time in seconds.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        current_timestamp()
    }
}

/// Manually driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: u64) {
        self.0.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Returns the current Unix timestamp.
///
/// Returns 0 if the system clock is before `UNIX_EPOCH`.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// TESTS
// =============================================================================
