//! # Signal Envelope
//!
//! The wire form of a signed [`Signal`] and the canonical encoding the MAC is
//! computed over.
//!
//! ## Wire Format
//!
//! ```text
//! {subject_id, context, kind, severity, reason_code, ttl,
//!  requires_ack, nonce, signature, created_at}
//! ```
//!
//! The field set is fixed. No additional fields are accepted.
//!
//! ## Canonical Encoding
//!
//! `canonical(signal minus signature)` is the compact JSON object of the nine
//! unsigned fields in envelope order. Struct field order is the serialization
//! order, so the encoding is stable for a given signal.

use crate::entities::{
    Nonce, ProductContext, ReasonCode, Signal, SignalDraft, SignalKind, SignatureTag, SubjectId,
};
use serde::{Deserialize, Serialize};

/// Every field name of the wire envelope, in canonical order.
pub const ENVELOPE_FIELDS: [&str; 10] = [
    "subject_id",
    "context",
    "kind",
    "severity",
    "reason_code",
    "ttl",
    "requires_ack",
    "nonce",
    "signature",
    "created_at",
];

/// Wire representation of a signed signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalEnvelope {
    pub subject_id: SubjectId,
    pub context: ProductContext,
    pub kind: SignalKind,
    pub severity: f64,
    pub reason_code: ReasonCode,
    pub ttl: u64,
    pub requires_ack: bool,
    pub nonce: Nonce,
    pub signature: SignatureTag,
    pub created_at: u64,
}

impl SignalEnvelope {
    /// Split into the typed signal. Performs no validation.
    pub fn into_signal(self) -> Signal {
        let draft = SignalDraft {
            subject_id: self.subject_id,
            context: self.context,
            kind: self.kind,
            severity: self.severity,
            reason_code: self.reason_code,
            ttl: self.ttl,
            requires_ack: self.requires_ack,
        };
        Signal::from_parts(draft, self.nonce, self.created_at, self.signature)
    }
}

impl From<&Signal> for SignalEnvelope {
    fn from(signal: &Signal) -> Self {
        let draft = signal.draft();
        Self {
            subject_id: draft.subject_id.clone(),
            context: draft.context,
            kind: draft.kind,
            severity: draft.severity,
            reason_code: draft.reason_code.clone(),
            ttl: draft.ttl,
            requires_ack: draft.requires_ack,
            nonce: *signal.nonce(),
            signature: signal.signature().clone(),
            created_at: signal.created_at(),
        }
    }
}

impl Signal {
    pub fn to_envelope(&self) -> SignalEnvelope {
        SignalEnvelope::from(self)
    }

    /// Canonical bytes of this signal minus its signature.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        canonical_bytes(self.draft(), self.nonce(), self.created_at())
    }
}

#[derive(Serialize)]
struct CanonicalFields<'a> {
    subject_id: &'a SubjectId,
    context: ProductContext,
    kind: SignalKind,
    severity: f64,
    reason_code: &'a ReasonCode,
    ttl: u64,
    requires_ack: bool,
    nonce: &'a Nonce,
    created_at: u64,
}

/// Canonical encoding of the unsigned fields.
pub fn canonical_bytes(
    draft: &SignalDraft,
    nonce: &Nonce,
    created_at: u64,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&CanonicalFields {
        subject_id: &draft.subject_id,
        context: draft.context,
        kind: draft.kind,
        severity: draft.severity,
        reason_code: &draft.reason_code,
        ttl: draft.ttl,
        requires_ack: draft.requires_ack,
        nonce,
        created_at,
    })
}
