//! # Field Extraction
//!
//! Typed accessors over a JSON object. Each accessor fails with a
//! [`SchemaViolation`] naming the field and the problem.

use serde_json::{Map, Value};
use shared_types::{FieldProblem, SchemaViolation};
use std::str::FromStr;

use crate::ValidationResult;

/// Borrowed view of an envelope object.
pub struct Fields<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    /// Fails with `MalformedJson` when `raw` is not an object.
    pub fn of(raw: &'a Value) -> ValidationResult<Self> {
        raw.as_object()
            .map(|map| Self { map })
            .ok_or_else(SchemaViolation::malformed)
    }

    /// Every name in `required` is present and non-null.
    pub fn require_all(&self, required: &[&str]) -> ValidationResult<()> {
        for name in required {
            self.get(name)?;
        }
        Ok(())
    }

    /// No key outside `allowed` is present.
    pub fn deny_unknown(&self, allowed: &[&str]) -> ValidationResult<()> {
        // Sorted so the reported field is deterministic.
        let mut keys: Vec<&String> = self.map.keys().collect();
        keys.sort();
        match keys.into_iter().find(|k| !allowed.contains(&k.as_str())) {
            Some(unknown) => Err(SchemaViolation::new(
                unknown.as_str(),
                FieldProblem::UnexpectedField,
            )),
            None => Ok(()),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.get(name).is_some_and(|v| !v.is_null())
    }

    pub fn get(&self, name: &str) -> ValidationResult<&'a Value> {
        match self.map.get(name) {
            Some(Value::Null) | None => Err(SchemaViolation::new(name, FieldProblem::Missing)),
            Some(value) => Ok(value),
        }
    }

    pub fn str(&self, name: &str) -> ValidationResult<&'a str> {
        self.get(name)?
            .as_str()
            .ok_or_else(|| SchemaViolation::new(name, FieldProblem::WrongType))
    }

    /// Parse a string field with the type's own `FromStr`.
    pub fn parse<T>(&self, name: &str) -> ValidationResult<T>
    where
        T: FromStr<Err = FieldProblem>,
    {
        self.str(name)?
            .parse()
            .map_err(|problem| SchemaViolation::new(name, problem))
    }

    /// Parse a string field with an explicit parser.
    pub fn parse_with<T, F>(&self, name: &str, parser: F) -> ValidationResult<T>
    where
        F: FnOnce(&str) -> Result<T, FieldProblem>,
    {
        parser(self.str(name)?).map_err(|problem| SchemaViolation::new(name, problem))
    }

    pub fn bool(&self, name: &str) -> ValidationResult<bool> {
        self.get(name)?
            .as_bool()
            .ok_or_else(|| SchemaViolation::new(name, FieldProblem::WrongType))
    }

    /// Finite real number.
    pub fn f64(&self, name: &str) -> ValidationResult<f64> {
        let value = self.get(name)?;
        let number = value
            .as_f64()
            .ok_or_else(|| SchemaViolation::new(name, FieldProblem::WrongType))?;
        if !number.is_finite() {
            return Err(SchemaViolation::new(name, FieldProblem::OutOfRange));
        }
        Ok(number)
    }

    /// Non-negative integer. Negative or fractional numbers are out of range.
    pub fn u64(&self, name: &str) -> ValidationResult<u64> {
        let value = self.get(name)?;
        match value.as_u64() {
            Some(n) => Ok(n),
            None if value.is_number() => Err(SchemaViolation::new(name, FieldProblem::OutOfRange)),
            None => Err(SchemaViolation::new(name, FieldProblem::WrongType)),
        }
    }
}
