//! # Pending Registry
//!
//! Maps request ids to the waiting resolution task.
//!
//! Flow:
//! 1. `reserve()` takes a slot under `max_pending_requests` or fails fast
//! 2. `register()` stores the request and returns a oneshot receiver
//! 3. A decision, a cancel or the deadline calls `resolve()`
//! 4. The resolution task calls `finish()` once the outcome is audited
//!
//! `resolve()` is the single-writer guard: the first caller takes the
//! sender, every later caller sees [`Claim::AlreadyClaimed`]. Once the
//! deadline has passed, any resolution other than the timeout itself claims
//! the request as TIMED_OUT instead.
//!
//! A loser that wants to record its own entry waits on `settled()` so the
//! terminal entry is always in the audit log first.

use super::request::AuthorizationRequest;
use dashmap::DashMap;
use shared_types::{AuthorizationState, Decision, RequestId};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::debug;

/// What ended a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Decided(Decision),
    Cancelled,
    TimedOut,
}

impl Resolution {
    pub fn state(&self) -> AuthorizationState {
        match self {
            Resolution::Decided(decision) => (*decision).into(),
            Resolution::Cancelled => AuthorizationState::Cancelled,
            Resolution::TimedOut => AuthorizationState::TimedOut,
        }
    }
}

/// Result of a `resolve()` attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This caller resolved the request.
    Won,
    /// Another resolution already won; carries the state it resolves to.
    AlreadyClaimed(AuthorizationState),
    /// No live request with this id.
    Unknown,
}

/// One slot under the pending bound. Released on drop.
#[derive(Debug)]
pub struct Reservation {
    in_use: Arc<AtomicUsize>,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
struct PendingEntry {
    request: AuthorizationRequest,
    deadline: Instant,
    resolver: Option<oneshot::Sender<Resolution>>,
    claimed: Option<AuthorizationState>,
    /// Dropped by `finish`, after the terminal entry is audited.
    settled: watch::Sender<()>,
    _reservation: Reservation,
}

#[derive(Debug, Default)]
pub struct PendingStats {
    pub registered: AtomicU64,
    pub resolved: AtomicU64,
    pub claim_conflicts: AtomicU64,
}

#[derive(Debug)]
pub struct PendingRegistry {
    entries: DashMap<RequestId, PendingEntry>,
    in_use: Arc<AtomicUsize>,
    limit: usize,
    stats: PendingStats,
}

impl PendingRegistry {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: DashMap::new(),
            in_use: Arc::new(AtomicUsize::new(0)),
            limit,
            stats: PendingStats::default(),
        }
    }

    /// Take a slot, or `None` when `limit` slots are in use.
    pub fn reserve(&self) -> Option<Reservation> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .ok()
            .map(|_| Reservation {
                in_use: Arc::clone(&self.in_use),
            })
    }

    pub fn register(
        &self,
        request: AuthorizationRequest,
        reservation: Reservation,
        deadline: Instant,
    ) -> oneshot::Receiver<Resolution> {
        let (tx, rx) = oneshot::channel();
        let request_id = request.request_id;
        self.entries.insert(
            request_id,
            PendingEntry {
                request,
                deadline,
                resolver: Some(tx),
                claimed: None,
                settled: watch::channel(()).0,
                _reservation: reservation,
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        debug!(request_id = %request_id, "Registered pending request");
        rx
    }

    /// Attempt to resolve `request_id`. Only the first attempt wins.
    pub fn resolve(&self, request_id: &RequestId, resolution: Resolution) -> Claim {
        let Some(mut entry) = self.entries.get_mut(request_id) else {
            return Claim::Unknown;
        };
        let overruled = resolution != Resolution::TimedOut && Instant::now() >= entry.deadline;
        let resolution = if overruled {
            Resolution::TimedOut
        } else {
            resolution
        };
        match entry.resolver.take() {
            Some(sender) => {
                entry.claimed = Some(resolution.state());
                // Receiver lives in the resolution task until `finish`.
                let _ = sender.send(resolution);
                if overruled {
                    Claim::AlreadyClaimed(AuthorizationState::TimedOut)
                } else {
                    Claim::Won
                }
            }
            None => {
                self.stats.claim_conflicts.fetch_add(1, Ordering::Relaxed);
                Claim::AlreadyClaimed(entry.claimed.unwrap_or(AuthorizationState::Pending))
            }
        }
    }

    /// Remove the entry after its outcome is recorded. Frees its slot.
    pub fn finish(&self, request_id: &RequestId) -> Option<AuthorizationRequest> {
        let (_, entry) = self.entries.remove(request_id)?;
        self.stats.resolved.fetch_add(1, Ordering::Relaxed);
        Some(entry.request)
    }

    /// Wait until `request_id` is finished. Returns at once for unknown or
    /// already finished requests.
    pub async fn settled(&self, request_id: &RequestId) {
        let waiter = self
            .entries
            .get(request_id)
            .map(|entry| entry.settled.subscribe());
        if let Some(mut waiter) = waiter {
            // Only ever completes with an error, when the sender is dropped.
            let _ = waiter.changed().await;
        }
    }

    /// Snapshot of a live request.
    pub fn get(&self, request_id: &RequestId) -> Option<AuthorizationRequest> {
        self.entries.get(request_id).map(|e| e.request.clone())
    }

    /// Requests registered and not yet finished.
    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }

    /// Slots in use, including requests still waiting for their turn.
    pub fn slots_in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}
