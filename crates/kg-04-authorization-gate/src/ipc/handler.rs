//! # Decision Handler
//!
//! Consumes `DecisionIssued` events from the wired channel and hands them
//! to the gate together with their channel stamp.
//!
//! ## Security
//!
//! - The stamp travels with every decision; the gate rejects stamps minted
//!   by any other channel
//! - Non-decision events are ignored here

use crate::error::GateError;
use crate::service::{AuthorizationGate, Delivery, Origin};
use shared_bus::{Delivered, GatewayEvent, Subscription};
use tracing::{debug, warn};

pub struct DecisionHandler {
    gate: AuthorizationGate,
}

impl DecisionHandler {
    pub fn new(gate: AuthorizationGate) -> Self {
        Self { gate }
    }

    /// Handle one delivered event. `None` for events that carry no decision.
    pub async fn handle(&self, delivered: Delivered) -> Option<Result<Delivery, GateError>> {
        match delivered.event {
            GatewayEvent::DecisionIssued(decision) => Some(
                self.gate
                    .deliver(Origin::Channel(delivered.stamp), decision)
                    .await,
            ),
            other => {
                debug!(topic = ?other.topic(), "Decision handler skipped event");
                None
            }
        }
    }

    /// Handle events until the channel closes.
    pub async fn run(self, mut subscription: Subscription) {
        while let Some(delivered) = subscription.recv().await {
            let sequence = delivered.stamp.sequence();
            if let Some(Err(err)) = self.handle(delivered).await {
                warn!(sequence, error = %err, code = err.error_code(), "Decision not delivered");
            }
        }
        debug!("Decision handler stopped, channel closed");
    }
}
