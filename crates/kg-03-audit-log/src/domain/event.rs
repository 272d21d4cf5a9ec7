//! # Audit Events
//!
//! One variant per security or authorization event. Payloads carry opaque
//! codes and identifiers only, never free text.

use serde::{Deserialize, Serialize};
use shared_types::{
    ActionType, AuthorizationState, Decision, ProductContext, RequestId, SignalKind, SubjectId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    /// Signal passed signature, TTL and replay checks.
    SignalAccepted {
        subject_id: SubjectId,
        nonce: String,
        context: ProductContext,
        kind: SignalKind,
    },

    /// Signal failed validation or verification. `reason` is an error code.
    SignalRejected {
        subject_id: Option<SubjectId>,
        reason: String,
    },

    /// Decision or signal arrived outside the wired channel.
    UnauthorizedChannel {
        request_id: Option<RequestId>,
        origin: String,
    },

    /// Request entered PENDING.
    RequestCreated {
        request_id: RequestId,
        action_type: ActionType,
        subject_id: SubjectId,
        nonce: String,
    },

    RequestAllowed {
        request_id: RequestId,
    },

    RequestDenied {
        request_id: RequestId,
    },

    RequestTimedOut {
        request_id: RequestId,
    },

    RequestCancelled {
        request_id: RequestId,
    },

    /// Request refused before entering PENDING (e.g. overload).
    RequestRejected {
        subject_id: SubjectId,
        action_type: ActionType,
        reason: String,
    },

    /// Decision that changed nothing.
    LateDecisionIgnored {
        request_id: RequestId,
        decision: Decision,
        reason: String,
    },

    /// Caller applied the effect of an ALLOWED request.
    ActionApplied {
        request_id: RequestId,
        action_type: ActionType,
    },

    /// Operator cleared an integrity halt.
    IntegrityHaltCleared {
        operator: String,
        violation_at: u64,
    },
}

impl AuditEvent {
    /// Terminal event for a resolved request. `None` for PENDING.
    pub fn resolution(request_id: RequestId, state: AuthorizationState) -> Option<Self> {
        match state {
            AuthorizationState::Pending => None,
            AuthorizationState::Allowed => Some(AuditEvent::RequestAllowed { request_id }),
            AuthorizationState::Denied => Some(AuditEvent::RequestDenied { request_id }),
            AuthorizationState::TimedOut => Some(AuditEvent::RequestTimedOut { request_id }),
            AuthorizationState::Cancelled => Some(AuditEvent::RequestCancelled { request_id }),
        }
    }

    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::SignalAccepted { .. } => "SIGNAL_ACCEPTED",
            AuditEvent::SignalRejected { .. } => "SIGNAL_REJECTED",
            AuditEvent::UnauthorizedChannel { .. } => "UNAUTHORIZED_CHANNEL",
            AuditEvent::RequestCreated { .. } => "REQUEST_CREATED",
            AuditEvent::RequestAllowed { .. } => "REQUEST_ALLOWED",
            AuditEvent::RequestDenied { .. } => "REQUEST_DENIED",
            AuditEvent::RequestTimedOut { .. } => "REQUEST_TIMED_OUT",
            AuditEvent::RequestCancelled { .. } => "REQUEST_CANCELLED",
            AuditEvent::RequestRejected { .. } => "REQUEST_REJECTED",
            AuditEvent::LateDecisionIgnored { .. } => "LATE_DECISION_IGNORED",
            AuditEvent::ActionApplied { .. } => "ACTION_APPLIED",
            AuditEvent::IntegrityHaltCleared { .. } => "INTEGRITY_HALT_CLEARED",
        }
    }

    /// Request this event concerns, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            AuditEvent::RequestCreated { request_id, .. }
            | AuditEvent::RequestAllowed { request_id }
            | AuditEvent::RequestDenied { request_id }
            | AuditEvent::RequestTimedOut { request_id }
            | AuditEvent::RequestCancelled { request_id }
            | AuditEvent::LateDecisionIgnored { request_id, .. }
            | AuditEvent::ActionApplied { request_id, .. } => Some(*request_id),
            AuditEvent::UnauthorizedChannel { request_id, .. } => *request_id,
            _ => None,
        }
    }

    /// Authorization state this event records, if it is a transition.
    pub fn state(&self) -> Option<AuthorizationState> {
        match self {
            AuditEvent::RequestCreated { .. } => Some(AuthorizationState::Pending),
            AuditEvent::RequestAllowed { .. } => Some(AuthorizationState::Allowed),
            AuditEvent::RequestDenied { .. } => Some(AuthorizationState::Denied),
            AuditEvent::RequestTimedOut { .. } => Some(AuthorizationState::TimedOut),
            AuditEvent::RequestCancelled { .. } => Some(AuthorizationState::Cancelled),
            _ => None,
        }
    }

    /// Canonical payload bytes.
    pub fn canonical(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
