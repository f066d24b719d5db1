use serde_json::Value;

use crate::error::EngineError;
use crate::state::PartialState;

mod normalize;
#[cfg(test)]
mod tests;

pub use normalize::{to_snake_case, FieldNormalizer};

/// Parses an inbound broker payload into a normalized partial update.
///
/// The payload must be UTF-8 JSON whose top level is an object. Field names
/// are normalized to snake_case; values are kept as-is (numbers, booleans,
/// strings, `null`, and nested structures alike). Unknown fields are kept.
pub fn parse_payload(
    payload: &[u8],
    normalizer: &FieldNormalizer,
) -> Result<PartialState, EngineError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| EngineError::MessageParse(e.to_string()))?;

    match value {
        Value::Object(object) => Ok(normalizer.normalize(object)),
        other => Err(EngineError::MessageParse(format!(
            "expected a JSON object, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
