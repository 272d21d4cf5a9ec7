//! # Freshness Rules
//!
//! `age = now - created_at`. A signal is fresh while `age <= ttl`; a
//! timestamp more than [`MAX_FUTURE_SKEW`] seconds ahead of `now` is treated
//! as expired.

use super::errors::SecurityError;
use shared_types::MAX_FUTURE_SKEW;

/// Reject stale or future-dated signals.
pub fn check_freshness(created_at: u64, ttl: u64, now: u64) -> Result<(), SecurityError> {
    let age = now as i64 - created_at as i64;

    if created_at > now.saturating_add(MAX_FUTURE_SKEW) {
        return Err(SecurityError::TtlExpired { age, ttl });
    }
    if age > 0 && age as u64 > ttl {
        return Err(SecurityError::TtlExpired { age, ttl });
    }
    Ok(())
}

/// Expiry recorded in the replay cache for an accepted signal.
///
/// Covers the whole interval in which the same signal would still pass
/// [`check_freshness`].
pub fn replay_expiry(created_at: u64, ttl: u64, now: u64) -> u64 {
    created_at.max(now).saturating_add(ttl)
}
