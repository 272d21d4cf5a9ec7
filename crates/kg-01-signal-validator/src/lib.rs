//! # kg-01-signal-validator
//!
//! Schema enforcement for the canonical signal envelope, producer drafts
//! and Core's decision envelope.
//!
//! ```text
//! Producer ──draft──→ Validator ──SignalDraft──→ Security Manager (sign)
//! Channel ──envelope──→ Validator ──Signal──→ Security Manager (verify)
//! Core ──decision──→ Validator ──DecisionEnvelope──→ Authorization Gate
//! ```
//!
//! A rejected message never reaches the Security Manager.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod service;

pub use service::{
    SignalValidator, Submission, ValidatorConfig, DECISION_FIELDS, DRAFT_FIELDS,
};

/// Result of a validation step.
pub type ValidationResult<T> = Result<T, shared_types::SchemaViolation>;
