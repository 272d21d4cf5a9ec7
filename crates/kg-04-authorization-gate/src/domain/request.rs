//! # Authorization Request
//!
//! Created when an irreversible signal is accepted, mutated only by the gate
//! on a decision, a timeout or a cancel, then archived read-only.

use parking_lot::Mutex;
use serde::Serialize;
use shared_types::{ActionType, AuthorizationState, RequestId, SignalRef};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationRequest {
    pub request_id: RequestId,
    pub action_type: ActionType,
    pub signal_ref: SignalRef,
    state: AuthorizationState,
    pub created_at: u64,
    resolved_at: Option<u64>,
    applied: bool,
}

impl AuthorizationRequest {
    pub fn new(
        request_id: RequestId,
        action_type: ActionType,
        signal_ref: SignalRef,
        created_at: u64,
    ) -> Self {
        Self {
            request_id,
            action_type,
            signal_ref,
            state: AuthorizationState::Pending,
            created_at,
            resolved_at: None,
            applied: false,
        }
    }

    pub fn state(&self) -> AuthorizationState {
        self.state
    }

    pub fn resolved_at(&self) -> Option<u64> {
        self.resolved_at
    }

    pub fn applied(&self) -> bool {
        self.applied
    }

    /// Apply the single terminal transition. Returns false if the request
    /// already left PENDING or `next` is not terminal.
    pub fn resolve(&mut self, next: AuthorizationState, at: u64) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.resolved_at = Some(at);
        true
    }

    /// Record that the caller applied the effect. ALLOWED only, once.
    pub fn mark_applied(&mut self) -> bool {
        if !self.state.permits_effect() || self.applied {
            return false;
        }
        self.applied = true;
        true
    }
}

/// Bounded history of resolved requests. Oldest evicted first.
#[derive(Debug)]
pub struct RequestArchive {
    inner: Mutex<ArchiveInner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct ArchiveInner {
    records: HashMap<RequestId, AuthorizationRequest>,
    order: VecDeque<RequestId>,
}

impl RequestArchive {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(ArchiveInner::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&self, record: AuthorizationRequest) {
        let mut inner = self.inner.lock();
        let id = record.request_id;
        if inner.records.insert(id, record).is_none() {
            inner.order.push_back(id);
        }
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.records.remove(&oldest);
            }
        }
    }

    pub fn get(&self, request_id: &RequestId) -> Option<AuthorizationRequest> {
        self.inner.lock().records.get(request_id).cloned()
    }

    pub fn state_of(&self, request_id: &RequestId) -> Option<AuthorizationState> {
        self.inner.lock().records.get(request_id).map(|r| r.state)
    }

    /// Mark the archived request applied. `None` if it was evicted.
    pub fn mark_applied(&self, request_id: &RequestId) -> Option<bool> {
        self.inner
            .lock()
            .records
            .get_mut(request_id)
            .map(AuthorizationRequest::mark_applied)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
