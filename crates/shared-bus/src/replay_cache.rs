//! # Replay Cache
//!
//! Bounded set of recently accepted `(subject_id, nonce)` pairs with expiry.
//!
//! ## Security Design
//!
//! - An entry is live while `now <= expiry`. A live pair is never accepted
//!   twice.
//! - Expired entries are removed lazily on lookup and by a background sweep.
//! - When the cache is full, expired entries are swept inline; if it is still
//!   full the insert fails instead of evicting a live entry. Evicting a live
//!   entry would reopen the replay window for it.

use parking_lot::Mutex;
use shared_types::{Clock, Nonce, SubjectId, MAX_FUTURE_SKEW};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Errors from replay cache operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The pair is still live in the cache.
    #[error("nonce {nonce_prefix}.. already accepted for this subject")]
    Replayed { nonce_prefix: String },

    /// Every slot holds a live entry.
    #[error("replay cache full ({capacity} live entries)")]
    CapacityExhausted { capacity: usize },
}

/// Time-bounded replay cache keyed by `(subject_id, nonce)`.
pub struct ReplayCache {
    /// Map of (subject, nonce) -> expiry (unix seconds, inclusive).
    entries: Mutex<HashMap<(SubjectId, Nonce), u64>>,

    /// Maximum number of live entries.
    capacity: usize,

    /// Upper bound on how long any entry is retained (seconds).
    window_secs: u64,

    clock: Arc<dyn Clock>,
}

impl ReplayCache {
    /// Default maximum number of live entries.
    pub const DEFAULT_CAPACITY: usize = 100_000;

    /// Default retention window (seconds).
    pub const DEFAULT_WINDOW_SECS: u64 = 3600;

    #[must_use]
    pub fn new(capacity: usize, window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
            window_secs,
            clock,
        }
    }

    /// Check the pair and record it until `expiry` if it is not live.
    ///
    /// The recorded expiry is clamped to `now + window + MAX_FUTURE_SKEW`, so
    /// a signal stamped up to the skew bound ahead of `now` stays covered for
    /// its whole ttl when `window >= ttl`.
    ///
    /// # Errors
    ///
    /// - `ReplayError::Replayed` - the pair is live
    /// - `ReplayError::CapacityExhausted` - no room even after a sweep
    pub fn check_and_insert(
        &self,
        subject: &SubjectId,
        nonce: &Nonce,
        expiry: u64,
    ) -> Result<(), ReplayError> {
        let now = self.clock.now_secs();
        let horizon = now
            .saturating_add(self.window_secs)
            .saturating_add(MAX_FUTURE_SKEW);
        let expiry = expiry.min(horizon);
        let key = (subject.clone(), *nonce);

        let mut entries = self.entries.lock();

        if let Some(&existing) = entries.get(&key) {
            if existing >= now {
                return Err(ReplayError::Replayed {
                    nonce_prefix: nonce.short(),
                });
            }
            // Lazy expiry
            entries.remove(&key);
        }

        if entries.len() >= self.capacity {
            let before = entries.len();
            entries.retain(|_, exp| *exp >= now);
            debug!(removed = before - entries.len(), "Inline replay cache sweep");
            if entries.len() >= self.capacity {
                warn!(capacity = self.capacity, "Replay cache exhausted");
                return Err(ReplayError::CapacityExhausted {
                    capacity: self.capacity,
                });
            }
        }

        entries.insert(key, expiry);
        Ok(())
    }

    /// Whether the pair is currently live.
    #[must_use]
    pub fn contains(&self, subject: &SubjectId, nonce: &Nonce) -> bool {
        let now = self.clock.now_secs();
        self.entries
            .lock()
            .get(&(subject.clone(), *nonce))
            .is_some_and(|exp| *exp >= now)
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, exp| *exp >= now);
        before - entries.len()
    }

    /// Number of stored entries (live or not yet swept).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Spawn the background sweep task. It stops once `shutdown` flips to
    /// `true` or its sender is dropped.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep_expired();
                        if removed > 0 {
                            debug!(removed, remaining = self.len(), "Replay cache swept");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Replay cache sweeper stopped");
                            return;
                        }
                    }
                }
            }
        })
    }
}
