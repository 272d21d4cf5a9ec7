//! # Audit Log Subsystem (KG-03)
//!
//! Append-only, hash-chained record of every security and authorization
//! event. Each entry commits to its predecessor:
//!
//! ```text
//! genesis ─► [0] ─► [1] ─► ... ─► [n]
//!   prev_hash(i) == entry_hash(i-1)
//! ```
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): events, entries, chain verification
//! - **Hasher** (`hasher.rs`): pluggable [`ChainHasher`], SHA-256 default
//! - **Stores** (`store.rs`): in-memory and JSON-lines file persistence
//! - **Writer** (`writer.rs`): [`AuditLog`], the single-writer handle
//!
//! Tampering with any stored field of any entry is reported by
//! [`AuditLog::verify_chain`] at that entry's sequence number and halts the
//! log until an operator intervenes.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod error;
pub mod hasher;
pub mod store;
pub mod writer;

pub use domain::{genesis_hash, verify_entries, AuditEntry, AuditEvent};
pub use error::{AuditError, AuditResult};
pub use hasher::{ChainHash, ChainHasher, Sha256Hasher, Sha3Hasher};
pub use store::{AuditStore, FileAuditStore, InMemoryAuditStore};
pub use writer::{AuditLog, AuditSummary, AUDIT_QUEUE_CAPACITY};
