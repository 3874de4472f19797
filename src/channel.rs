//! Channel configuration and the stateful per-scope value diff engine
//! (§3.2, §4.3).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// How a channel's values arrive from the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// A full state snapshot after every step.
    FullValue,
    /// Deltas only, pre-computed by the runtime.
    DeltaOnly,
}

/// What a channel's values represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// A list of messages; new finalized messages are deduplicated and
    /// emitted as `MessageReceived` (§4.5).
    Message,
    /// A presentation-oriented payload, tagged with an artifact type and
    /// re-emitted on every observation (§4.3).
    Artifact,
    /// Anything else.
    Generic,
}

/// A user-provided predicate that may veto emitting a value
/// (§3.2). Mirrors the `Arc<dyn Fn>` executor pattern used for tool
/// invocation elsewhere in the corpus this crate is grounded on.
pub type ValueFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Immutable configuration for one monitored state channel.
#[derive(Clone)]
pub struct ChannelConfig {
    /// The state field this channel monitors.
    pub key: String,
    pub delivery_mode: DeliveryMode,
    pub kind: ChannelKind,
    /// Required when `kind == Artifact`; tags the emitted `Artifact` event.
    pub artifact_type: Option<String>,
    /// Optional filter; a value for which this returns `false` is
    /// dropped (logged as [`crate::error::StreamError::ChannelFilterRejected`]).
    pub value_filter: Option<ValueFilter>,
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("key", &self.key)
            .field("delivery_mode", &self.delivery_mode)
            .field("kind", &self.kind)
            .field("artifact_type", &self.artifact_type)
            .field("value_filter", &self.value_filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl ChannelConfig {
    /// A GENERIC, FULL_VALUE channel with no filter — the common case.
    pub fn generic(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            delivery_mode: DeliveryMode::FullValue,
            kind: ChannelKind::Generic,
            artifact_type: None,
            value_filter: None,
        }
    }

    /// A MESSAGE-kind, FULL_VALUE channel.
    pub fn messages(key: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::Message,
            ..Self::generic(key)
        }
    }

    /// An ARTIFACT-kind, FULL_VALUE channel.
    pub fn artifact(key: impl Into<String>, artifact_type: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::Artifact,
            artifact_type: Some(artifact_type.into()),
            ..Self::generic(key)
        }
    }

    /// Same channel, but DELTA_ONLY delivery.
    pub fn delta_only(mut self) -> Self {
        self.delivery_mode = DeliveryMode::DeltaOnly;
        self
    }

    /// Attach a value filter.
    pub fn with_filter(mut self, filter: ValueFilter) -> Self {
        self.value_filter = Some(filter);
        self
    }

    pub fn passes_filter(&self, value: &Value) -> bool {
        match &self.value_filter {
            Some(filter) => filter(value),
            None => true,
        }
    }
}

/// Compute the value-level delta between a previous and current
/// observation (§4.3's delta rules).
///
/// Returns `None` when there is no previous value to diff against, or
/// when the values are identical. Mappings diff to their added/changed
/// keys; sequences diff to the new tail past the previous length;
/// scalars (and type changes) diff to the full new value.
pub fn value_delta(previous: Option<&Value>, current: &Value) -> Option<Value> {
    let previous = previous?;
    if previous == current {
        return None;
    }
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(cur_map)) => {
            let mut changed = serde_json::Map::new();
            for (k, v) in cur_map {
                if prev_map.get(k) != Some(v) {
                    changed.insert(k.clone(), v.clone());
                }
            }
            if changed.is_empty() {
                None
            } else {
                Some(Value::Object(changed))
            }
        }
        (Value::Array(prev_arr), Value::Array(cur_arr)) => {
            if cur_arr.len() > prev_arr.len() {
                Some(Value::Array(cur_arr[prev_arr.len()..].to_vec()))
            } else {
                Some(current.clone())
            }
        }
        _ => Some(current.clone()),
    }
}

/// The result of observing one channel's value in FULL_VALUE mode: the
/// current value plus whatever delta was computable against the
/// previous-state table.
#[derive(Debug, Clone)]
pub struct FullValueObservation {
    pub value: Value,
    pub delta: Option<Value>,
}

/// Per-`(scope, channel_key)` previous-value table (§3.6) plus the pure
/// diff rules, kept together because the table is the only mutable
/// state a FULL_VALUE observation needs.
#[derive(Debug, Default)]
pub struct ChannelDiffEngine {
    previous: HashMap<(String, String), Value>,
}

impl ChannelDiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a FULL_VALUE observation for `channel` in `scope`,
    /// returning the value and its delta against whatever was last
    /// stored for that `(scope, channel)` pair.
    pub fn observe_full_value(&mut self, scope: &str, channel: &str, value: &Value) -> FullValueObservation {
        let key = (scope.to_string(), channel.to_string());
        let delta = value_delta(self.previous.get(&key), value);
        self.previous.insert(key, value.clone());
        FullValueObservation {
            value: value.clone(),
            delta,
        }
    }

    /// Drop all previous-state entries (§3.9 session reset).
    pub fn reset(&mut self) {
        self.previous.clear();
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }
}
