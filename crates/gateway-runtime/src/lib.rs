//! # Karma-Gate Runtime
//!
//! Wiring and command surface for the trust gateway.
//!
//! - `container/` - configuration and the [`TrustGateway`] that owns every subsystem
//! - `handlers/` - JSON-lines commands for producers, Core and operators

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod container;
pub mod handlers;

pub use container::{
    AuditHasherKind, ConfigError, GatewayConfig, GatewaySummary, StartupError, SubmitResult,
    TrustGateway,
};
pub use handlers::{Command, CommandHandler, Response};
