//! # Command Handlers
//!
//! Operator and producer commands served over JSON lines.

pub mod commands;

pub use commands::{Command, CommandHandler, Response};
