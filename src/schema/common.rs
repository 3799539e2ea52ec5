//! Serialization contract shared by every schema type (spec §4.2).
//!
//! - Deterministic field ordering: struct fields are declared in canonical
//!   order and serde preserves declaration order, so the same value always
//!   serializes to the same bytes.
//! - Bounded float precision: confidence values are rounded to 4 decimals
//!   on emit via `round4`/`#[serde(serialize_with = "round4")]`, the Rust
//!   equivalent of a Pydantic `json_encoders`-style rounding hook.
//! - Enums serialize as lowercase underscore strings (`#[serde(rename_all =
//!   "snake_case")]` throughout `schema::*`).
//! - `schema_version` is validated against a known set on every read.

use serde::{Serialize, Serializer};

/// Schema versions this crate understands. Unknown versions are rejected on
/// read (I1).
pub const KNOWN_SCHEMA_VERSIONS: &[&str] = &["1.0.0"];

pub const CURRENT_SCHEMA_VERSION: &str = "1.0.0";

pub trait Validate {
    /// Validate semantic invariants beyond what the type system enforces
    /// (confidence bounds, known schema_version, non-empty required fields).
    fn validate(&self) -> Result<(), String>;
}

/// Round a confidence/probability value to 4 decimal places for emission.
pub fn round4<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(round4_value(*value))
}

pub fn round4_opt<S: Serializer>(value: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => s.serialize_some(&round4_value(*v)),
        None => s.serialize_none(),
    }
}

pub fn round4_value(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub fn is_known_schema_version(version: &str) -> bool {
    KNOWN_SCHEMA_VERSIONS.contains(&version)
}

pub fn validate_unit_interval(name: &str, value: f64) -> Result<(), String> {
    if !(0.0..=1.0).contains(&value) {
        Err(format!("{name} must be in [0, 1], got {value}"))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(transparent)]
pub struct Confidence(#[serde(serialize_with = "round4")] pub f64);

impl Confidence {
    pub fn new(value: f64) -> Result<Self, String> {
        validate_unit_interval("confidence", value)?;
        Ok(Confidence(value))
    }

    pub fn clamp(value: f64) -> Self {
        Confidence(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round4_rounds_half_up() {
        assert_eq!(round4_value(0.123_456), 0.1235);
        assert_eq!(round4_value(1.0), 1.0);
    }

    #[test]
    fn confidence_rejects_out_of_range() {
        assert!(Confidence::new(1.5).is_err());
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(0.5).is_ok());
    }
}
