//! Prometheus metrics for the trust gateway.
//!
//! All metrics follow the naming convention: `kg_<metric>_<unit>`
//!
//! Metrics are created lazily and registered on first use of
//! [`register_metrics`] or [`gather_metrics`]; registration is idempotent.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Once;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SECURITY MANAGER
    // =========================================================================

    pub static ref SIGNALS_SIGNED: IntCounter = IntCounter::new(
        "kg_signals_signed_total",
        "Total signals signed"
    ).expect("metric creation failed");

    pub static ref SIGNALS_ACCEPTED: IntCounter = IntCounter::new(
        "kg_signals_accepted_total",
        "Total signals that passed signature, TTL and replay checks"
    ).expect("metric creation failed");

    /// Rejections by opaque error code
    pub static ref SIGNALS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("kg_signals_rejected_total", "Rejected signals by reason"),
        &["reason"]
    ).expect("metric creation failed");

    pub static ref REPLAY_ATTEMPTS: IntCounter = IntCounter::new(
        "kg_replay_attempts_total",
        "Signals rejected because their nonce was already accepted"
    ).expect("metric creation failed");

    // =========================================================================
    // AUTHORIZATION GATE
    // =========================================================================

    pub static ref UNAUTHORIZED_CHANNEL: IntCounter = IntCounter::new(
        "kg_unauthorized_channel_total",
        "Attempts to reach the gate outside the wired channel"
    ).expect("metric creation failed");

    /// Terminal states reached by authorization requests
    pub static ref AUTHORIZATION_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new("kg_authorization_outcomes_total", "Authorization outcomes by state"),
        &["state"]
    ).expect("metric creation failed");

    pub static ref PENDING_REQUESTS: IntGauge = IntGauge::new(
        "kg_pending_requests",
        "Authorization requests currently pending"
    ).expect("metric creation failed");

    // =========================================================================
    // AUDIT LOG
    // =========================================================================

    pub static ref AUDIT_ENTRIES: IntCounter = IntCounter::new(
        "kg_audit_entries_total",
        "Entries appended to the audit chain"
    ).expect("metric creation failed");

    pub static ref AUDIT_INTEGRITY_VIOLATIONS: IntCounter = IntCounter::new(
        "kg_audit_integrity_violations_total",
        "Audit chain verifications that found tampering"
    ).expect("metric creation failed");
}

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry.
///
/// # Errors
///
/// Fails only if a collector is rejected for a reason other than prior
/// registration.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(SIGNALS_SIGNED.clone()),
            Box::new(SIGNALS_ACCEPTED.clone()),
            Box::new(SIGNALS_REJECTED.clone()),
            Box::new(REPLAY_ATTEMPTS.clone()),
            Box::new(UNAUTHORIZED_CHANNEL.clone()),
            Box::new(AUTHORIZATION_OUTCOMES.clone()),
            Box::new(PENDING_REQUESTS.clone()),
            Box::new(AUDIT_ENTRIES.clone()),
            Box::new(AUDIT_INTEGRITY_VIOLATIONS.clone()),
        ];

        for metric in metrics {
            match REGISTRY.register(metric) {
                Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
                Err(e) => {
                    result = Err(TelemetryError::Metrics(e.to_string()));
                    return;
                }
            }
        }
    });
    result
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    register_metrics()?;
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
}
