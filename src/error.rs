//! Error types for the stream processor
//!
//! Mirrors the Error Kinds table in the design: most faults are converted
//! into a terminal [`crate::events::StreamEvent::Error`] rather than raised
//! across the iterator boundary (see [`crate::processor`]). The two
//! locally-recoverable kinds never escape as `Err` values at all; they
//! exist here so the taxonomy is a checked type, not prose.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Everything that can go wrong while configuring or running a
/// [`crate::processor::StreamProcessor`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    /// Duplicate channel key, malformed namespace pattern, or an unknown
    /// mode requested at construction time. Fails before iteration starts.
    #[error("invalid stream processor configuration: {0}")]
    ConfigInvalid(String),

    /// A raw element from the runtime matched none of the accepted shapes.
    /// Terminal: the consumer sees an `Error` event, then the stream ends.
    #[error("unrecognized raw runtime output shape: {0}")]
    RawShapeUnknown(String),

    /// A tool-call argument fragment arrived for a `(message_id, index)`
    /// key that was never initialized. Locally recovered by dropping the
    /// fragment; never surfaced to the consumer.
    #[error("tool-call argument fragment for uninitialized call {message_id}[{index}]")]
    ToolCallOrphanArg {
        /// Enclosing message identifier.
        message_id: String,
        /// Chunk index within the message.
        index: u64,
    },

    /// A tool call's argument buffer was non-empty at the end of its
    /// message but never parsed as valid JSON. Recovered by transitioning
    /// the call to `ERROR` and surfacing a `ToolCall{status=result_error}`
    /// event; the stream itself continues.
    #[error("tool call {tool_call_id} closed with unparseable arguments: {reason}")]
    ToolCallInvalidJson {
        /// The tool call whose arguments never closed.
        tool_call_id: String,
        /// Parse failure description.
        reason: String,
    },

    /// A user-supplied channel value filter rejected a value. Locally
    /// recovered by dropping the value; never surfaced to the consumer.
    #[error("channel '{channel}' filter rejected a value in scope '{scope}'")]
    ChannelFilterRejected {
        /// Configured channel key.
        channel: String,
        /// Scope display name the value was observed in.
        scope: String,
    },

    /// The consumed runtime iterator raised instead of terminating
    /// cleanly. Terminal: surfaced as an `Error` event, then the stream
    /// ends.
    #[error("runtime iterator failed: {0}")]
    RuntimeFailure(String),
}

impl StreamError {
    /// The `kind` tag used in the terminal error event payload (§6.5).
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::ConfigInvalid(_) => "config_invalid",
            StreamError::RawShapeUnknown(_) => "raw_shape_unknown",
            StreamError::ToolCallOrphanArg { .. } => "tool_call_orphan_arg",
            StreamError::ToolCallInvalidJson { .. } => "tool_call_invalid_json",
            StreamError::ChannelFilterRejected { .. } => "channel_filter_rejected",
            StreamError::RuntimeFailure(_) => "runtime_failure",
        }
    }

    /// Whether this kind is ever surfaced to the consumer as a terminal
    /// event (§7's "Surface?" column).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamError::RawShapeUnknown(_) | StreamError::RuntimeFailure(_)
        )
    }
}
