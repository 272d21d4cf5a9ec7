//! # IPC Layer
//!
//! Channel-facing handlers. Decisions enter the gate only here.

pub mod handler;

pub use handler::DecisionHandler;
