//! # Operating Mode
//!
//! The gate never applies an effect on its own authority. The mode is a
//! configuration value threaded through every component at construction,
//! and `constraint-only` is the only value it can take.

use crate::errors::FieldProblem;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperatingMode {
    /// Every irreversible action waits for an explicit Core ALLOW.
    #[default]
    #[serde(rename = "constraint-only", alias = "constraint_only")]
    ConstraintOnly,
}

impl OperatingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::ConstraintOnly => "constraint-only",
        }
    }

    /// Whether the gate may apply an effect without a Core decision.
    pub fn allows_autonomous_effects(&self) -> bool {
        false
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = FieldProblem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constraint-only" | "constraint_only" => Ok(OperatingMode::ConstraintOnly),
            _ => Err(FieldProblem::UnknownVariant),
        }
    }
}
