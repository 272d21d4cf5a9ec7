//! # Gateway Events
//!
//! Every message that crosses the channel. Producers publish signed signals,
//! the authorization gate publishes must-acknowledge requests, and Core
//! publishes decisions back.

use serde::{Deserialize, Serialize};
use shared_types::{ActionType, DecisionEnvelope, RequestId, Signal, SignalEnvelope};

/// All events that can be published to the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A signed signal that does not need an acknowledgment.
    SignalPublished(Signal),

    /// A signed irreversible-action signal awaiting Core's decision.
    /// Source: Authorization Gate | Target: Core
    AckRequested {
        request_id: RequestId,
        action_type: ActionType,
        signal: Signal,
    },

    /// Core's decision on a pending request.
    /// Source: Core | Target: Authorization Gate
    DecisionIssued(DecisionEnvelope),
}

impl GatewayEvent {
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            GatewayEvent::SignalPublished(_) => EventTopic::Signals,
            GatewayEvent::AckRequested { .. } => EventTopic::AckRequests,
            GatewayEvent::DecisionIssued(_) => EventTopic::Decisions,
        }
    }

    /// The signal carried by this event, if any.
    #[must_use]
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            GatewayEvent::SignalPublished(signal) | GatewayEvent::AckRequested { signal, .. } => {
                Some(signal)
            }
            GatewayEvent::DecisionIssued(_) => None,
        }
    }

    /// Wire form for transports that carry JSON.
    #[must_use]
    pub fn to_wire(&self) -> WireEvent {
        match self {
            GatewayEvent::SignalPublished(signal) => WireEvent::Signal {
                signal: signal.to_envelope(),
            },
            GatewayEvent::AckRequested {
                request_id,
                action_type,
                signal,
            } => WireEvent::AckRequest {
                request_id: *request_id,
                action_type: *action_type,
                signal: signal.to_envelope(),
            },
            GatewayEvent::DecisionIssued(decision) => WireEvent::Decision {
                decision: decision.clone(),
            },
        }
    }
}

/// JSON representation of a [`GatewayEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    Signal {
        signal: SignalEnvelope,
    },
    AckRequest {
        request_id: RequestId,
        action_type: ActionType,
        signal: SignalEnvelope,
    },
    Decision {
        decision: DecisionEnvelope,
    },
}

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    Signals,
    AckRequests,
    Decisions,
    /// Matches every topic.
    All,
}

/// Filter for subscribing to specific topics.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to subscribe to. Empty means all.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    #[must_use]
    pub fn all() -> Self {
        Self { topics: vec![] }
    }

    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    #[must_use]
    pub fn matches(&self, event: &GatewayEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
