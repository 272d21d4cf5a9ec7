//! # Domain Layer
//!
//! Request records, the pending registry and per-subject ordering. No I/O.

pub mod pending;
pub mod request;
pub mod sequencer;

pub use pending::{Claim, PendingRegistry, Reservation, Resolution};
pub use request::{AuthorizationRequest, RequestArchive};
pub use sequencer::{SubjectSequencer, SubjectTurn};
