//! # Chain Verification
//!
//! Walks stored entries in order and reports the first entry that fails
//! any of:
//!
//! 1. `sequence_no` continues without gaps
//! 2. `prev_hash` equals the previous entry's `entry_hash` (genesis for 0)
//! 3. `payload_digest` re-derives from the stored event
//! 4. `entry_hash` re-derives from the stored fields

use super::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};
use crate::hasher::{ChainHash, ChainHasher};

/// Preimage of the genesis anchor.
pub const GENESIS_TAG: &[u8] = b"karma-gate-audit-genesis-v1";

/// `prev_hash` of sequence 0.
pub fn genesis_hash(hasher: &dyn ChainHasher) -> ChainHash {
    hasher.hash(&[GENESIS_TAG])
}

/// Verify the whole chain. Returns the number of entries checked.
pub fn verify_entries(hasher: &dyn ChainHasher, entries: &[AuditEntry]) -> AuditResult<u64> {
    let mut expected_prev = genesis_hash(hasher);

    for (index, entry) in entries.iter().enumerate() {
        let expected_seq = index as u64;
        let violation = AuditError::ChainIntegrityViolation {
            at_sequence: expected_seq,
        };

        if entry.sequence_no != expected_seq || entry.prev_hash != expected_prev {
            return Err(violation);
        }

        match AuditEntry::digest_payload(hasher, &entry.event) {
            Ok(digest) if digest == entry.payload_digest => {}
            _ => return Err(violation),
        }

        if entry.recompute_hash(hasher) != entry.entry_hash {
            return Err(violation);
        }

        expected_prev = entry.entry_hash;
    }

    Ok(entries.len() as u64)
}
