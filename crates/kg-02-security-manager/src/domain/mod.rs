//! # Domain Layer
//!
//! Pure security rules. No I/O, no shared state.

pub mod errors;
pub mod freshness;

pub use errors::SecurityError;
pub use freshness::{check_freshness, replay_expiry};
