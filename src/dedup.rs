//! Message deduplication (§3.7) and the MESSAGE-kind channel handler
//! (§4.5) built on top of it.

use std::collections::HashSet;

use serde_json::Value;

use crate::channel::FullValueObservation;
use crate::events::StreamEvent;
use crate::namespace;
use crate::tool_calls::ToolCallTracker;

/// Flat set of message identifiers already emitted as finalized
/// `MessageReceived` events, for exactly one streaming session.
#[derive(Debug, Default)]
pub struct MessageDeduplicator {
    seen: HashSet<String>,
}

impl MessageDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_new(&self, message_id: &str) -> bool {
        !self.seen.contains(message_id)
    }

    pub fn mark_seen(&mut self, message_id: &str) {
        self.seen.insert(message_id.to_string());
    }

    /// Drop every seen identifier (§3.9 session reset).
    pub fn reset(&mut self) {
        self.seen.clear();
    }
}

/// Handle one FULL_VALUE observation of a MESSAGE-kind channel (§4.3,
/// §4.5): identify messages new to this session, emit `MessageReceived`
/// for each (forwarding any embedded finalized tool calls or tool
/// results to the tracker), or fall back to a plain `ChannelValue` when
/// nothing in this observation is new.
pub fn handle_message_channel(
    scope: &str,
    channel: &str,
    observation: &FullValueObservation,
    dedup: &mut MessageDeduplicator,
    tracker: &mut ToolCallTracker,
) -> Vec<StreamEvent> {
    let node = namespace::node_name_from_display(scope);
    let candidates = new_candidates(observation);

    let mut emitted = Vec::new();
    for message in &candidates {
        let Some(id) = message.get("id").and_then(Value::as_str) else {
            continue;
        };
        if !dedup.is_new(id) {
            continue;
        }

        forward_finalized_tool_calls(message, id, scope, tracker);
        if let Some(tool_call_id) = message.get("tool_call_id").and_then(Value::as_str) {
            let success = !matches!(message.get("status").and_then(Value::as_str), Some("error"));
            let result = message.get("content").cloned().unwrap_or(Value::Null);
            tracker.link_result(tool_call_id, scope, success, result);
        }

        dedup.mark_seen(id);
        emitted.push(StreamEvent::MessageReceived {
            scope: scope.to_string(),
            node: node.clone(),
            message_id: id.to_string(),
            message: message.clone(),
        });
    }

    if emitted.is_empty() {
        return vec![StreamEvent::ChannelValue {
            scope: scope.to_string(),
            node,
            channel: channel.to_string(),
            value: observation.value.clone(),
            delta: observation.delta.clone(),
        }];
    }
    emitted
}

fn new_candidates(observation: &FullValueObservation) -> Vec<Value> {
    match &observation.delta {
        Some(Value::Array(items)) => items.clone(),
        Some(_) => Vec::new(),
        None => match &observation.value {
            Value::Array(items) => items.clone(),
            _ => Vec::new(),
        },
    }
}

fn forward_finalized_tool_calls(message: &Value, message_id: &str, scope: &str, tracker: &mut ToolCallTracker) {
    let Some(Value::Array(tool_calls)) = message.get("tool_calls") else {
        return;
    };
    for (index, tc) in tool_calls.iter().enumerate() {
        let Some(id) = tc.get("id").and_then(Value::as_str) else {
            continue;
        };
        let name = tc.get("name").and_then(Value::as_str);
        let args = tc.get("args").cloned().unwrap_or(Value::Null);
        tracker.register_finalized_call(message_id, index as u64, id, name, args, scope);
    }
}
