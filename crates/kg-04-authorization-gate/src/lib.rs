//! # Authorization Gate Subsystem (KG-04)
//!
//! Gates every irreversible action behind an explicit Core decision.
//!
//! ```text
//!              ┌──ALLOW──→ [ALLOWED]   → Applied
//! [PENDING] ───┼──DENY───→ [DENIED]    → Discarded
//!              ├─deadline→ [TIMED_OUT] → NoOp
//!              └─cancel──→ [CANCELLED] → Discarded
//! ```
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): request records, pending registry,
//!   per-subject sequencer
//! - **Service Layer** (`service.rs`): [`AuthorizationGate`]
//! - **IPC Layer** (`ipc/`): [`DecisionHandler`], the only decision ingress
//! - **Ingress** (`ingress.rs`): consumer-side signal acceptance
//!
//! Absence of a decision is never an implicit ALLOW.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod error;
pub mod ingress;
pub mod ipc;
pub mod outcome;
pub mod service;

pub use domain::{AuthorizationRequest, Resolution};
pub use error::GateError;
pub use ingress::SignalIngress;
pub use ipc::DecisionHandler;
pub use outcome::{AuthorizationOutcome, Disposition};
pub use service::{
    AuthorizationGate, Delivery, GateConfig, Origin, PendingAuthorization, DEFAULT_ACK_TIMEOUT,
    DEFAULT_ARCHIVE_CAPACITY, DEFAULT_MAX_PENDING_REQUESTS,
};
