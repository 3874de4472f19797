//! Raw-output parser: normalizes the runtime's four accepted wire shapes
//! into a uniform `(scope_display, mode, chunk)` triple (§4.2).
//!
//! The runtime hands us loosely-typed JSON rather than a Rust enum, so
//! disambiguation is structural: we inspect shape (array length, element
//! types) rather than ever trying `isinstance`-style probing. This is the
//! "replace shape probing with a pattern-matching sum type" note from the
//! design section, applied at the boundary where the sum type doesn't
//! exist yet because the producer is untyped.

use serde_json::Value;

use crate::error::{Result, StreamError};
use crate::namespace::{self, Namespace};

/// The three runtime streaming modes (§2, §11.1 of the full spec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Full state snapshots.
    Values,
    /// Incremental state deltas.
    Updates,
    /// Tokenized LLM messages.
    Messages,
}

impl StreamMode {
    /// Parse the wire name of a mode, used when disambiguating case 2
    /// (`(mode, chunk)` pairs).
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "values" => Some(StreamMode::Values),
            "updates" => Some(StreamMode::Updates),
            "messages" => Some(StreamMode::Messages),
            _ => None,
        }
    }
}

/// Parse one raw runtime element into its normalized triple.
///
/// `default_mode` is the single mode the caller requested; it is used
/// only for case 1 (bare chunk), where the wire carries no mode tag at
/// all because only one mode was ever active.
pub fn parse_raw(raw: &Value, default_mode: StreamMode) -> Result<(String, StreamMode, Value)> {
    if let Value::Array(items) = raw {
        match items.as_slice() {
            [first, second] if is_string_array(first) && second.is_object() => {
                let scope = to_namespace(first)?;
                return Ok((namespace::display_name(&scope), default_mode, second.clone()));
            }
            [first, second] if matches!(first, Value::String(_)) => {
                if let Value::String(name) = first {
                    if let Some(mode) = StreamMode::from_wire_name(name) {
                        return Ok((namespace::ROOT_DISPLAY_NAME.to_string(), mode, second.clone()));
                    }
                }
            }
            [first, second] if is_message_shaped(first) => {
                let scope = metadata_scope(second)?;
                let chunk = serde_json::json!({ "message": first, "metadata": second });
                return Ok((scope, StreamMode::Messages, chunk));
            }
            [first, second, third] if is_string_array(first) => {
                let scope = to_namespace(first)?;
                let mode = match second {
                    Value::String(name) => StreamMode::from_wire_name(name).ok_or_else(|| {
                        StreamError::RawShapeUnknown(format!("unrecognized mode name '{name}'"))
                    })?,
                    other => {
                        return Err(StreamError::RawShapeUnknown(format!(
                            "scope/mode/chunk triple's mode element was not a string: {other}"
                        )))
                    }
                };
                return Ok((namespace::display_name(&scope), mode, third.clone()));
            }
            [first, _, _] => {
                return Err(StreamError::RawShapeUnknown(format!(
                    "triple's first element was not a scope tuple of strings: {first}"
                )))
            }
            _ => {}
        }
    }

    // Case 1: bare chunk, no subgraphs, single mode already known.
    Ok((namespace::ROOT_DISPLAY_NAME.to_string(), default_mode, raw.clone()))
}

fn is_string_array(value: &Value) -> bool {
    matches!(value, Value::Array(items) if items.iter().all(|v| v.is_string()))
}

/// A message-shaped object carries at minimum a string `id` (§6.2).
fn is_message_shaped(value: &Value) -> bool {
    matches!(value, Value::Object(map) if matches!(map.get("id"), Some(Value::String(_))))
}

fn to_namespace(value: &Value) -> Result<Namespace> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| StreamError::RawShapeUnknown("scope tuple contained a non-string element".into()))
            })
            .collect(),
        other => Err(StreamError::RawShapeUnknown(format!(
            "expected a scope tuple, found: {other}"
        ))),
    }
}

/// Resolve the scope display name for a `(message, metadata)` pair: the
/// runtime stamps every token-mode chunk's metadata with its scope
/// (§4.6 step 1).
fn metadata_scope(metadata: &Value) -> Result<String> {
    match metadata.get("scope") {
        Some(Value::Array(_)) => {
            let ns = to_namespace(metadata.get("scope").unwrap())?;
            Ok(namespace::display_name(&ns))
        }
        Some(Value::String(s)) => Ok(s.clone()),
        None => Ok(namespace::ROOT_DISPLAY_NAME.to_string()),
        Some(other) => Err(StreamError::RawShapeUnknown(format!(
            "token-mode metadata's scope field had an unexpected shape: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_chunk_uses_default_mode() {
        let raw = json!({ "counter": 1 });
        let (scope, mode, chunk) = parse_raw(&raw, StreamMode::Values).unwrap();
        assert_eq!(scope, "main");
        assert_eq!(mode, StreamMode::Values);
        assert_eq!(chunk, raw);
    }

    #[test]
    fn mode_chunk_pair() {
        let raw = json!(["updates", { "counter": 1 }]);
        let (scope, mode, chunk) = parse_raw(&raw, StreamMode::Values).unwrap();
        assert_eq!(scope, "main");
        assert_eq!(mode, StreamMode::Updates);
        assert_eq!(chunk, json!({ "counter": 1 }));
    }

    #[test]
    fn scope_chunk_pair() {
        let raw = json!([["clarify", "t1"], { "counter": 1 }]);
        let (scope, mode, _chunk) = parse_raw(&raw, StreamMode::Values).unwrap();
        assert_eq!(scope, "clarify:t1");
        assert_eq!(mode, StreamMode::Values);
    }

    #[test]
    fn scope_mode_chunk_triple() {
        let raw = json!([["clarify", "t1"], "updates", { "counter": 1 }]);
        let (scope, mode, _chunk) = parse_raw(&raw, StreamMode::Values).unwrap();
        assert_eq!(scope, "clarify:t1");
        assert_eq!(mode, StreamMode::Updates);
    }

    #[test]
    fn message_metadata_pair_resolves_scope_from_metadata() {
        let raw = json!([
            { "id": "m1", "content": "hi" },
            { "scope": ["clarify", "t1"] }
        ]);
        let (scope, mode, chunk) = parse_raw(&raw, StreamMode::Values).unwrap();
        assert_eq!(scope, "clarify:t1");
        assert_eq!(mode, StreamMode::Messages);
        assert_eq!(chunk["message"]["id"], "m1");
    }

    #[test]
    fn message_metadata_pair_without_scope_defaults_to_main() {
        let raw = json!([{ "id": "m1" }, {}]);
        let (scope, mode, _chunk) = parse_raw(&raw, StreamMode::Values).unwrap();
        assert_eq!(scope, "main");
        assert_eq!(mode, StreamMode::Messages);
    }

    #[test]
    fn unknown_shape_triple_with_mapping_first_element_is_an_error() {
        let raw = json!([{ "not": "a scope" }, "updates", { "counter": 1 }]);
        let err = parse_raw(&raw, StreamMode::Values).unwrap_err();
        assert_eq!(err.kind(), "raw_shape_unknown");
    }

    #[test]
    fn pair_of_two_unrecognized_strings_falls_back_to_bare_chunk() {
        // Neither a known mode name nor a message-shaped object: this is
        // structurally ambiguous input, which we choose to treat as an
        // opaque bare chunk rather than guess.
        let raw = json!(["not-a-mode", "also-not-a-chunk"]);
        let (scope, mode, chunk) = parse_raw(&raw, StreamMode::Values).unwrap();
        assert_eq!(scope, "main");
        assert_eq!(mode, StreamMode::Values);
        assert_eq!(chunk, raw);
    }
}
