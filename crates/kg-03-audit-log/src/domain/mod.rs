//! # Domain Layer
//!
//! Audit events, chain entries and the verification walk. Pure: hashing is
//! injected, nothing here touches storage.

pub mod chain;
pub mod entry;
pub mod event;

pub use chain::{genesis_hash, verify_entries, GENESIS_TAG};
pub use entry::AuditEntry;
pub use event::AuditEvent;
