//! # Shared Types Crate
//!
//! Domain entities, the signal envelope and the error taxonomy shared by
//! every gateway subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Closed Enumerations**: `kind`, `context`, `action_type` and `decision`
//!   are tagged variants; unknown values fail at the type boundary.
//! - **Immutable Signals**: A signed [`Signal`] has no setters. Any change to
//!   its fields invalidates the signature.
//! - **Pluggable Primitives**: The MAC and the clock are traits, wired at
//!   composition time.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod mode;
pub mod security;

pub use entities::*;
pub use envelope::{canonical_bytes, SignalEnvelope, ENVELOPE_FIELDS};
pub use errors::*;
pub use mode::OperatingMode;
pub use security::*;
