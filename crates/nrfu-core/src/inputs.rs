//! Declarative input parsing for test factories.
//!
//! Catalog inputs arrive as untyped trees; each test declares a serde
//! struct and parses through [`parse_inputs`], which turns any shape
//! mismatch into `BadInputs` naming the test. Integer fields use the
//! lenient deserializers because operators write both `60` and `60.0`
//! in catalogs.

use crate::error::NrfuError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parse a test's declarative inputs into its typed input struct.
///
/// A catalog entry with no `inputs` key arrives as null; that is treated
/// as an empty mapping so tests whose fields all have defaults need no
/// stanza at all.
pub fn parse_inputs<T: DeserializeOwned>(test: &str, inputs: Value) -> Result<T, NrfuError> {
    let inputs = match inputs {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(inputs).map_err(|e| NrfuError::bad_inputs(test, e.to_string()))
}

/// Deserialize a `u64` accepting both integer and whole-valued float forms.
pub fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if raw >= 0.0 && raw.fract() == 0.0 {
        Ok(raw as u64)
    } else {
        Err(serde::de::Error::custom(format!(
            "expected a non-negative integer, got {}",
            raw
        )))
    }
}
