//! Tool-call reconstruction state machine (§3.4, §4.4).
//!
//! Chunks for a given tool call are linked by `(message_id, chunk_index)`;
//! only the first chunk for that key carries `tool_call_id` and
//! `tool_name`. JSON validity is checked incrementally by recomputing a
//! brace/bracket "structural balance" over the whole accumulated buffer —
//! simpler than a real streaming parser and sufficient because we already
//! hold the full buffer in memory.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::events::{StreamEvent, ToolCallEventStatus};

/// Lifecycle state of one tracked tool call (§3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Initializing,
    Streaming,
    Completed,
    Error,
    ResultSuccess,
    ResultError,
}

/// Tracked state for one `(message_id, chunk_index)` tool call.
#[derive(Debug, Clone)]
pub struct ToolCallState {
    pub tool_call_id: String,
    pub tool_name: Option<String>,
    pub scope: String,
    pub status: ToolCallStatus,
    pub accumulated_args: String,
    pub parsed_args: Option<Value>,
    pub result: Option<Value>,
}

/// Owns every in-flight and completed tool call for one streaming
/// session.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    entries: HashMap<(String, u64), ToolCallState>,
    id_index: HashMap<String, (String, u64)>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one tool-call chunk (§4.6 step 4 forwards here).
    ///
    /// `id`/`name` are `Some` only on the first chunk of a
    /// `(message_id, index)` sequence; an argument fragment may be empty.
    pub fn handle_chunk(
        &mut self,
        message_id: &str,
        index: u64,
        id: Option<&str>,
        name: Option<&str>,
        args_fragment: &str,
        scope: &str,
    ) -> Vec<StreamEvent> {
        let key = (message_id.to_string(), index);

        if !self.entries.contains_key(&key) {
            let Some(tool_call_id) = id else {
                warn!(message_id, index, "tool-call argument fragment for uninitialized call");
                return Vec::new();
            };
            let state = ToolCallState {
                tool_call_id: tool_call_id.to_string(),
                tool_name: name.map(str::to_string),
                scope: scope.to_string(),
                status: ToolCallStatus::Streaming,
                accumulated_args: args_fragment.to_string(),
                parsed_args: None,
                result: None,
            };
            self.id_index.insert(tool_call_id.to_string(), key.clone());
            let event = StreamEvent::ToolCall {
                scope: state.scope.clone(),
                node: crate::namespace::node_name_from_display(&state.scope),
                tool_call_id: state.tool_call_id.clone(),
                tool_name: state.tool_name.clone(),
                status: ToolCallEventStatus::ArgsStarted,
                accumulated_args: None,
                parsed_args: None,
                result: None,
            };
            self.entries.insert(key, state);
            return vec![event];
        }

        let state = self.entries.get_mut(&key).expect("checked contains_key above");
        if !matches!(state.status, ToolCallStatus::Streaming) {
            // Arguments arriving after the call already closed are ignored.
            return Vec::new();
        }
        state.accumulated_args.push_str(args_fragment);

        if let Some(parsed) = try_parse_complete(&state.accumulated_args) {
            state.parsed_args = Some(parsed.clone());
            state.status = ToolCallStatus::Completed;
            vec![StreamEvent::ToolCall {
                scope: state.scope.clone(),
                node: crate::namespace::node_name_from_display(&state.scope),
                tool_call_id: state.tool_call_id.clone(),
                tool_name: state.tool_name.clone(),
                status: ToolCallEventStatus::ArgsReady,
                accumulated_args: Some(state.accumulated_args.clone()),
                parsed_args: Some(parsed),
                result: None,
            }]
        } else {
            vec![StreamEvent::ToolCall {
                scope: state.scope.clone(),
                node: crate::namespace::node_name_from_display(&state.scope),
                tool_call_id: state.tool_call_id.clone(),
                tool_name: state.tool_name.clone(),
                status: ToolCallEventStatus::ArgsStreaming,
                accumulated_args: Some(state.accumulated_args.clone()),
                parsed_args: None,
                result: None,
            }]
        }
    }

    /// Close out every still-open call belonging to `message_id`: a
    /// non-empty buffer that never parsed transitions to `ERROR`
    /// (§4.4, §7's `ToolCallInvalidJson`); a buffer that parses only now
    /// (e.g. a single complete-JSON chunk) still reaches `COMPLETED`.
    pub fn finalize_message(&mut self, message_id: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for ((mid, _index), state) in self.entries.iter_mut() {
            if mid != message_id || !matches!(state.status, ToolCallStatus::Streaming) {
                continue;
            }
            if state.accumulated_args.trim().is_empty() {
                continue;
            }
            if let Some(parsed) = try_parse_complete(&state.accumulated_args) {
                state.parsed_args = Some(parsed.clone());
                state.status = ToolCallStatus::Completed;
                events.push(StreamEvent::ToolCall {
                    scope: state.scope.clone(),
                    node: crate::namespace::node_name_from_display(&state.scope),
                    tool_call_id: state.tool_call_id.clone(),
                    tool_name: state.tool_name.clone(),
                    status: ToolCallEventStatus::ArgsReady,
                    accumulated_args: Some(state.accumulated_args.clone()),
                    parsed_args: Some(parsed),
                    result: None,
                });
            } else {
                state.status = ToolCallStatus::Error;
                debug!(tool_call_id = %state.tool_call_id, "tool call closed with unparseable arguments");
                events.push(StreamEvent::ToolCall {
                    scope: state.scope.clone(),
                    node: crate::namespace::node_name_from_display(&state.scope),
                    tool_call_id: state.tool_call_id.clone(),
                    tool_name: state.tool_name.clone(),
                    status: ToolCallEventStatus::ResultError,
                    accumulated_args: Some(state.accumulated_args.clone()),
                    parsed_args: None,
                    result: None,
                });
            }
        }
        events
    }

    /// Register a tool call that arrived already finalized — e.g. a
    /// message's `tool_calls` list rather than a chunked stream (§4.5
    /// step 3) — directly as `COMPLETED`, returning its `args_ready`
    /// event.
    pub fn register_finalized_call(
        &mut self,
        message_id: &str,
        index: u64,
        tool_call_id: &str,
        tool_name: Option<&str>,
        args: Value,
        scope: &str,
    ) -> StreamEvent {
        let key = (message_id.to_string(), index);
        let accumulated_args = serde_json::to_string(&args).unwrap_or_default();
        let state = ToolCallState {
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.map(str::to_string),
            scope: scope.to_string(),
            status: ToolCallStatus::Completed,
            accumulated_args,
            parsed_args: Some(args.clone()),
            result: None,
        };
        self.id_index.insert(tool_call_id.to_string(), key.clone());
        let event = StreamEvent::ToolCall {
            scope: state.scope.clone(),
            node: crate::namespace::node_name_from_display(&state.scope),
            tool_call_id: state.tool_call_id.clone(),
            tool_name: state.tool_name.clone(),
            status: ToolCallEventStatus::ArgsReady,
            accumulated_args: Some(state.accumulated_args.clone()),
            parsed_args: Some(args),
            result: None,
        };
        self.entries.insert(key, state);
        event
    }

    /// Link a tool result to its initiating call by `tool_call_id`
    /// (§4.5 step 3, §4.4's result linkage). Succeeds even if the call's
    /// initialization was never observed — in that case only the result
    /// event is emitted, with `tool_name = None` (Open Question 2).
    pub fn link_result(&mut self, tool_call_id: &str, scope: &str, success: bool, result: Value) -> StreamEvent {
        let status = if success {
            ToolCallEventStatus::ResultSuccess
        } else {
            ToolCallEventStatus::ResultError
        };

        if let Some(key) = self.id_index.get(tool_call_id).cloned() {
            if let Some(state) = self.entries.get_mut(&key) {
                state.status = if success {
                    ToolCallStatus::ResultSuccess
                } else {
                    ToolCallStatus::ResultError
                };
                state.result = Some(result.clone());
                return StreamEvent::ToolCall {
                    scope: state.scope.clone(),
                    node: crate::namespace::node_name_from_display(&state.scope),
                    tool_call_id: state.tool_call_id.clone(),
                    tool_name: state.tool_name.clone(),
                    status,
                    accumulated_args: Some(state.accumulated_args.clone()),
                    parsed_args: state.parsed_args.clone(),
                    result: Some(result),
                };
            }
        }

        StreamEvent::ToolCall {
            scope: scope.to_string(),
            node: crate::namespace::node_name_from_display(scope),
            tool_call_id: tool_call_id.to_string(),
            tool_name: None,
            status,
            accumulated_args: None,
            parsed_args: None,
            result: Some(result),
        }
    }

    /// Drop every tracked call (§3.9 session reset, §4.4 reset).
    pub fn reset(&mut self) {
        self.entries.clear();
        self.id_index.clear();
    }

    #[cfg(test)]
    fn status_of(&self, message_id: &str, index: u64) -> Option<ToolCallStatus> {
        self.entries.get(&(message_id.to_string(), index)).map(|s| s.status)
    }
}

/// Compute the escape- and string-aware brace/bracket structural balance
/// of `buffer`, then attempt a strict parse only once that balance is
/// zero and the buffer is non-empty (§4.4's incremental validation).
fn try_parse_complete(buffer: &str) -> Option<Value> {
    if structural_balance(buffer) != 0 {
        return None;
    }
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Running `{`/`}` and `[`/`]` balance over `buffer`, ignoring brackets
/// that appear inside a JSON string literal and respecting `\`-escapes
/// within those strings.
fn structural_balance(buffer: &str) -> i64 {
    let mut balance: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for ch in buffer.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => balance += 1,
            '}' | ']' => balance -= 1,
            _ => {}
        }
    }
    balance
}
