//! # Signal Ingress
//!
//! Consumer-side acceptance of signals received through the channel. The
//! channel delivers at least once; verification here (signature, TTL,
//! replay) turns that into exactly-once acceptance.

use crate::error::GateError;
use gateway_telemetry::UNAUTHORIZED_CHANNEL;
use kg_02_security_manager::SignalSecurity;
use kg_03_audit_log::{AuditEvent, AuditLog};
use shared_bus::{ChannelId, Delivered, Subscription};
use shared_types::Signal;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SignalIngress {
    security: Arc<dyn SignalSecurity>,
    audit: AuditLog,
    channel_id: ChannelId,
}

impl SignalIngress {
    /// Accept signals stamped by `channel_id` only.
    pub fn new(security: Arc<dyn SignalSecurity>, audit: AuditLog, channel_id: ChannelId) -> Self {
        Self {
            security,
            audit,
            channel_id,
        }
    }

    /// Verify and audit the signal carried by `delivered`.
    ///
    /// Returns `Ok(None)` for events without a signal.
    pub async fn accept(&self, delivered: &Delivered) -> Result<Option<Signal>, GateError> {
        if !delivered.stamp.issued_by(self.channel_id) {
            UNAUTHORIZED_CHANNEL.inc();
            warn!("Security event: signal stamped by a foreign channel");
            self.audit
                .append(AuditEvent::UnauthorizedChannel {
                    request_id: None,
                    origin: "FOREIGN_CHANNEL".to_string(),
                })
                .await?;
            return Err(GateError::UnauthorizedChannel {
                reason: "FOREIGN_CHANNEL",
            });
        }
        let Some(signal) = delivered.event.signal() else {
            return Ok(None);
        };

        match self.security.verify(signal) {
            Ok(()) => {
                self.audit
                    .append(AuditEvent::SignalAccepted {
                        subject_id: signal.subject_id().clone(),
                        nonce: signal.nonce().short(),
                        context: signal.context(),
                        kind: signal.kind(),
                    })
                    .await?;
                Ok(Some(signal.clone()))
            }
            Err(err) => {
                self.audit
                    .append(AuditEvent::SignalRejected {
                        subject_id: Some(signal.subject_id().clone()),
                        reason: err.error_code().to_string(),
                    })
                    .await?;
                Err(err.into())
            }
        }
    }

    /// Accept signals until the channel closes. Returns the number accepted.
    pub async fn run(self, mut subscription: Subscription) -> u64 {
        let mut accepted = 0;
        while let Some(delivered) = subscription.recv().await {
            match self.accept(&delivered).await {
                Ok(Some(_)) => accepted += 1,
                Ok(None) => {}
                Err(err) => debug!(code = err.error_code(), "Inbound signal refused"),
            }
        }
        accepted
    }
}
