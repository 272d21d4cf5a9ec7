//! # Security Manager Subsystem (KG-02)
//!
//! Signs outgoing signals and verifies incoming ones: signature, freshness,
//! uniqueness.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): errors and freshness rules, no I/O
//! - **Ports Layer** (`ports/`): the [`SignalSecurity`] contract
//! - **Service Layer** (`service.rs`): [`SecurityManager`], wiring the MAC,
//!   the clock and the replay cache
//!
//! ## Security Notes
//!
//! - **Constant-time MAC comparison** via the pluggable `MacAlgorithm`
//! - **Nonces**: 128 bits from the OS RNG, assigned at signing time
//! - **Secrets** never appear in logs; nonces are logged truncated

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::SecurityError;
pub use ports::inbound::SignalSecurity;
pub use service::{SecurityManager, SecuritySummary};
