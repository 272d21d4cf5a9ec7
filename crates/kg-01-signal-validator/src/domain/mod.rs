//! Field-level rules for the canonical envelopes.

pub mod fields;

pub use fields::Fields;
