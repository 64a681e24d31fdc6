//! Textual payload normalization.
//!
//! Payloads often arrive as loosely quoted literals (`{'a': None, 'b': True}`)
//! rather than JSON. They are rewritten by a fixed table of substitutions,
//! applied in order, before being parsed as JSON. Later rules assume earlier
//! ones already ran: the escaped-quote rule only makes sense once every
//! single quote has become a double quote, and must run after that rule so
//! the single quotes it produces survive.

use serde_json::{Map, Value};

use crate::error::{SessionError, SessionResult};

/// Ordered `(pattern, replacement)` rewrites applied to raw payload text.
pub const NORMALIZATION_RULES: [(&str, &str); 5] = [
    ("None", "null"),
    ("'", "\""),
    // `\\"` carries a literal single quote through a double-quoted value,
    // e.g. `clish -c \\"show core-dump status\\"`.
    ("\\\\\"", "'"),
    ("True", "true"),
    ("False", "false"),
];

/// Apply [`NORMALIZATION_RULES`] to `text`, in order.
#[must_use]
pub fn normalize_payload(text: &str) -> String {
    NORMALIZATION_RULES
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            acc.replace(pattern, replacement)
        })
}

/// Normalize and parse a textual payload into a JSON mapping.
///
/// A `null` payload is treated as an empty mapping.
///
/// # Errors
///
/// Returns [`SessionError::InvalidPayload`] when the normalized text is not
/// JSON or is not a mapping.
pub fn parse_payload(text: &str) -> SessionResult<Value> {
    let normalized = normalize_payload(text);
    let value: Value = serde_json::from_str(&normalized)
        .map_err(|err| SessionError::invalid_payload(format!("{err} (in `{normalized}`)")))?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        other => Err(SessionError::invalid_payload(format!(
            "expected a mapping, found `{other}`"
        ))),
    }
}
