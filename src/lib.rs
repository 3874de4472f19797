//! Streaming event demultiplexer and state machine for a graph-based
//! agent execution runtime.
//!
//! The runtime emits interleaved updates across several modes — full
//! state snapshots, incremental deltas, and tokenized messages — over a
//! hierarchy of concurrently running execution scopes. [`StreamProcessor`]
//! turns that raw, shape-variable firehose into a single ordered sequence
//! of typed [`events::StreamEvent`]s with stable invariants: per-scope
//! ordering, cross-mode message deduplication, and incremental
//! reconstruction of tool-call arguments that arrive without their own
//! stable identifiers.
//!
//! ```text
//! Raw Runtime Output → Parser → Router → {Channel Diff Engine | Token Streamer | Tool-Call Tracker} → Typed Event Stream
//! ```

pub mod channel;
pub mod dedup;
pub mod error;
pub mod events;
pub mod namespace;
pub mod processor;
pub mod raw;
pub mod tokens;
pub mod tool_calls;

pub use channel::{ChannelConfig, ChannelKind, DeliveryMode};
pub use error::{Result, StreamError};
pub use events::{StreamEvent, ToolCallEventStatus};
pub use namespace::{Namespace, TokenStreamConfig, ALL_NAMESPACES, ROOT_DISPLAY_NAME};
pub use processor::{ProcessorConfig, ProcessorConfigBuilder, StreamProcessor};
pub use raw::StreamMode;
