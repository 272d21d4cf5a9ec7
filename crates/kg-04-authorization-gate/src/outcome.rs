//! # Authorization Outcome
//!
//! The explicit result every caller receives. Outcomes are minted only by
//! the gate, after the terminal transition is in the audit log.

use serde::Serialize;
use shared_types::{ActionType, AuthorizationState, RequestId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the caller may do with the underlying action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    /// ALLOWED: the caller may proceed.
    Applied,
    /// DENIED or CANCELLED: the action is dropped.
    Discarded,
    /// TIMED_OUT: safe no-op.
    NoOp,
}

impl Disposition {
    pub fn for_state(state: AuthorizationState) -> Self {
        match state {
            AuthorizationState::Allowed => Disposition::Applied,
            AuthorizationState::Denied | AuthorizationState::Cancelled => Disposition::Discarded,
            AuthorizationState::TimedOut | AuthorizationState::Pending => Disposition::NoOp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationOutcome {
    request_id: RequestId,
    action_type: ActionType,
    state: AuthorizationState,
    disposition: Disposition,
    #[serde(skip)]
    applied: Arc<AtomicBool>,
}

impl AuthorizationOutcome {
    pub(crate) fn new(
        request_id: RequestId,
        action_type: ActionType,
        state: AuthorizationState,
    ) -> Self {
        Self {
            request_id,
            action_type,
            state,
            disposition: Disposition::for_state(state),
            applied: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn action_type(&self) -> ActionType {
        self.action_type
    }

    pub fn state(&self) -> AuthorizationState {
        self.state
    }

    pub fn disposition(&self) -> Disposition {
        self.disposition
    }

    pub fn is_allowed(&self) -> bool {
        self.state.permits_effect()
    }

    /// Claim the one application of this outcome's effect.
    pub(crate) fn claim_application(&self) -> bool {
        !self.applied.swap(true, Ordering::AcqRel)
    }

    /// Give back a claim whose application never happened.
    pub(crate) fn release_application(&self) {
        self.applied.store(false, Ordering::Release);
    }
}
