//! # Audit Entry
//!
//! ```text
//! payload_digest = H(canonical(event))
//! entry_hash     = H(tag | prev_hash | sequence_no | event_type | timestamp | payload_digest)
//! ```
//!
//! Variable-length fields are length-prefixed so no two distinct entries
//! share a preimage.

use super::event::AuditEvent;
use crate::error::AuditResult;
use crate::hasher::{ChainHash, ChainHasher};
use serde::{Deserialize, Serialize};

const ENTRY_TAG: &[u8] = b"karma-gate-audit-entry-v1";

/// Append-only chain node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence_no: u64,
    pub prev_hash: ChainHash,
    pub entry_hash: ChainHash,
    pub payload_digest: ChainHash,
    /// Unix seconds.
    pub timestamp: u64,
    pub event: AuditEvent,
}

impl AuditEntry {
    /// Build the next entry after `prev_hash`.
    pub fn seal(
        hasher: &dyn ChainHasher,
        sequence_no: u64,
        prev_hash: ChainHash,
        timestamp: u64,
        event: AuditEvent,
    ) -> AuditResult<Self> {
        let payload_digest = Self::digest_payload(hasher, &event)?;
        let entry_hash = Self::compute_hash(
            hasher,
            &prev_hash,
            sequence_no,
            event.event_type(),
            timestamp,
            &payload_digest,
        );
        Ok(Self {
            sequence_no,
            prev_hash,
            entry_hash,
            payload_digest,
            timestamp,
            event,
        })
    }

    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    pub fn digest_payload(hasher: &dyn ChainHasher, event: &AuditEvent) -> AuditResult<ChainHash> {
        Ok(hasher.hash(&[&event.canonical()?]))
    }

    pub fn compute_hash(
        hasher: &dyn ChainHasher,
        prev_hash: &ChainHash,
        sequence_no: u64,
        event_type: &str,
        timestamp: u64,
        payload_digest: &ChainHash,
    ) -> ChainHash {
        let type_len = (event_type.len() as u64).to_le_bytes();
        hasher.hash(&[
            ENTRY_TAG,
            &prev_hash.0,
            &sequence_no.to_le_bytes(),
            &type_len,
            event_type.as_bytes(),
            &timestamp.to_le_bytes(),
            &payload_digest.0,
        ])
    }

    /// Recompute this entry's hash from its stored fields.
    pub fn recompute_hash(&self, hasher: &dyn ChainHasher) -> ChainHash {
        Self::compute_hash(
            hasher,
            &self.prev_hash,
            self.sequence_no,
            self.event_type(),
            self.timestamp,
            &self.payload_digest,
        )
    }
}
