//! The typed event taxonomy (§3.8) every pipeline stage yields into.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a tool call as observed by the [`crate::tool_calls::ToolCallTracker`]
/// state machine (§4.4), reflected outward in [`StreamEvent::ToolCall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallEventStatus {
    /// INITIALIZING → STREAMING transition.
    ArgsStarted,
    /// An argument fragment arrived while STREAMING.
    ArgsStreaming,
    /// The argument buffer parsed as valid JSON; call is COMPLETED.
    ArgsReady,
    /// A matching tool result was observed and parsed as success.
    ResultSuccess,
    /// A matching tool result was observed and represents a failure, or
    /// the argument buffer never closed as valid JSON.
    ResultError,
}

/// One event in the stream processor's output sequence (§3.8).
///
/// Every variant carries the originating scope display name; most also
/// carry the leaf node name, when the scope is non-root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A token-mode content delta for one message.
    TokenStream {
        scope: String,
        node: Option<String>,
        message_id: String,
        content_delta: String,
        accumulated_content: String,
        message_tag: Option<String>,
    },
    /// A full channel value observation (MESSAGE/GENERIC channel, or
    /// MESSAGE channel content that isn't itself a new finalized
    /// message).
    ChannelValue {
        scope: String,
        node: Option<String>,
        channel: String,
        value: Value,
        delta: Option<Value>,
    },
    /// A DELTA_ONLY observation for a GENERIC channel.
    ChannelUpdate {
        scope: String,
        node: Option<String>,
        channel: String,
        delta: Value,
    },
    /// An ARTIFACT-kind channel observation. Re-emitted on every
    /// observation by documented policy (§4.3, Open Question 1).
    Artifact {
        scope: String,
        node: Option<String>,
        channel: String,
        artifact_type: String,
        payload: Value,
        delta: Option<Value>,
    },
    /// A newly observed, deduplicated, finalized message.
    MessageReceived {
        scope: String,
        node: Option<String>,
        message_id: String,
        message: Value,
    },
    /// A tool-call lifecycle or result transition.
    ToolCall {
        scope: String,
        node: Option<String>,
        tool_call_id: String,
        tool_name: Option<String>,
        status: ToolCallEventStatus,
        accumulated_args: Option<String>,
        parsed_args: Option<Value>,
        result: Option<Value>,
    },
    /// A terminal fault, emitted immediately before the sequence ends
    /// (§6.5, §7).
    Error { kind: String, message: String },
}

impl StreamEvent {
    /// The scope display name carried by every variant.
    pub fn scope(&self) -> Option<&str> {
        match self {
            StreamEvent::TokenStream { scope, .. }
            | StreamEvent::ChannelValue { scope, .. }
            | StreamEvent::ChannelUpdate { scope, .. }
            | StreamEvent::Artifact { scope, .. }
            | StreamEvent::MessageReceived { scope, .. }
            | StreamEvent::ToolCall { scope, .. } => Some(scope),
            StreamEvent::Error { .. } => None,
        }
    }

    /// Whether this event terminates the sequence (it is always the
    /// final element when present).
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error { .. })
    }
}
