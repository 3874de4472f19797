//! The orchestrator (§4.7): owns every stage's state for one streaming
//! session and drives the pipeline from a raw runtime iterator to a
//! typed event sequence.

use std::collections::HashSet;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::channel::{ChannelConfig, ChannelKind, DeliveryMode};
use crate::dedup::{handle_message_channel, MessageDeduplicator};
use crate::error::{Result, StreamError};
use crate::events::StreamEvent;
use crate::namespace::{self, TokenStreamConfig};
use crate::raw::{parse_raw, StreamMode};
use crate::tokens::TokenStreamer;
use crate::tool_calls::ToolCallTracker;

/// Immutable configuration for one [`StreamProcessor`] (§6.4).
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfig {
    pub channels: Vec<ChannelConfig>,
    pub token_streaming: TokenStreamConfig,
}

impl ProcessorConfig {
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::default()
    }

    /// Eager configuration checks that must fail before iteration starts
    /// (§7: `ConfigInvalid`).
    pub fn validate(&self) -> Result<()> {
        let mut seen_keys = HashSet::new();
        for channel in &self.channels {
            if channel.key.is_empty() {
                return Err(StreamError::ConfigInvalid("channel key must not be empty".into()));
            }
            if !seen_keys.insert(channel.key.clone()) {
                return Err(StreamError::ConfigInvalid(format!("duplicate channel key '{}'", channel.key)));
            }
            if channel.kind == ChannelKind::Artifact && channel.artifact_type.is_none() {
                return Err(StreamError::ConfigInvalid(format!(
                    "artifact channel '{}' is missing its artifact type",
                    channel.key
                )));
            }
        }
        for pattern in self
            .token_streaming
            .enabled_namespaces
            .iter()
            .chain(self.token_streaming.excluded_namespaces.iter())
        {
            if pattern.is_empty() {
                return Err(StreamError::ConfigInvalid("namespace pattern must not be empty".into()));
            }
        }
        Ok(())
    }

    /// The minimum set of runtime modes to request (§4.7).
    pub fn requested_modes(&self) -> HashSet<StreamMode> {
        let mut modes = HashSet::new();
        if self.token_streaming.is_active() {
            modes.insert(StreamMode::Messages);
        }
        if self.channels.iter().any(|c| c.delivery_mode == DeliveryMode::FullValue) {
            modes.insert(StreamMode::Values);
        }
        if self.channels.iter().any(|c| c.delivery_mode == DeliveryMode::DeltaOnly) {
            modes.insert(StreamMode::Updates);
        }
        modes
    }
}

#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    channels: Vec<ChannelConfig>,
    token_streaming: TokenStreamConfig,
}

impl ProcessorConfigBuilder {
    pub fn channel(mut self, channel: ChannelConfig) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channels(mut self, channels: impl IntoIterator<Item = ChannelConfig>) -> Self {
        self.channels.extend(channels);
        self
    }

    pub fn token_streaming(mut self, config: TokenStreamConfig) -> Self {
        self.token_streaming = config;
        self
    }

    pub fn build(self) -> Result<ProcessorConfig> {
        let config = ProcessorConfig {
            channels: self.channels,
            token_streaming: self.token_streaming,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Owns every stage's mutable state for exactly one streaming session
/// (§3.9). There is no `reset` method: [`StreamProcessor::run`] consumes
/// `self`, so dropping the returned stream — by exhaustion, by the
/// consumer abandoning the pull, or by panic unwinding — drops every
/// table for free.
pub struct StreamProcessor {
    config: ProcessorConfig,
    channel_engine: crate::channel::ChannelDiffEngine,
    tracker: ToolCallTracker,
    token_streamer: TokenStreamer,
    dedup: MessageDeduplicator,
}

impl StreamProcessor {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        let token_streamer = TokenStreamer::new(config.token_streaming.clone());
        Ok(Self {
            config,
            channel_engine: crate::channel::ChannelDiffEngine::new(),
            tracker: ToolCallTracker::new(),
            token_streamer,
            dedup: MessageDeduplicator::new(),
        })
    }

    /// Stream one graph invocation's worth of events (§4.7). Consumes
    /// `self`; the returned stream is finite and restartable only by
    /// constructing a new processor.
    pub fn run<S>(mut self, mut raw_stream: S) -> impl Stream<Item = StreamEvent>
    where
        S: Stream<Item = std::result::Result<Value, String>> + Unpin + Send + 'static,
    {
        stream! {
            let modes = self.config.requested_modes();
            let default_mode = pick_default_mode(&modes);
            debug!(?modes, "resolved requested stream modes");

            loop {
                let next = raw_stream.next().await;
                let Some(item) = next else { break };

                let raw = match item {
                    Ok(raw) => raw,
                    Err(message) => {
                        error!(%message, "runtime iterator failed");
                        yield StreamEvent::Error {
                            kind: StreamError::RuntimeFailure(message.clone()).kind().to_string(),
                            message,
                        };
                        return;
                    }
                };

                match parse_raw(&raw, default_mode) {
                    Err(err) => {
                        error!(error = %err, "unrecognized raw runtime output shape");
                        yield StreamEvent::Error {
                            kind: err.kind().to_string(),
                            message: err.to_string(),
                        };
                        return;
                    }
                    Ok((scope, mode, chunk)) => {
                        for event in self.route(&scope, mode, &chunk) {
                            yield event;
                        }
                    }
                }
            }
        }
    }

    fn route(&mut self, scope: &str, mode: StreamMode, chunk: &Value) -> Vec<StreamEvent> {
        match mode {
            StreamMode::Messages => self.route_token_chunk(scope, chunk),
            StreamMode::Values => self.route_full_value_chunk(scope, chunk),
            StreamMode::Updates => self.route_delta_chunk(scope, chunk),
        }
    }

    fn route_token_chunk(&mut self, scope: &str, chunk: &Value) -> Vec<StreamEvent> {
        let mut events = self.token_streamer.process(scope, chunk, &mut self.tracker);
        for event in &events {
            if let StreamEvent::TokenStream { message_id, .. } = event {
                self.dedup.mark_seen(message_id);
            }
        }

        let message = chunk.get("message");
        let is_final = message.and_then(|m| m.get("is_final")).and_then(Value::as_bool).unwrap_or(false);
        if is_final {
            if let Some(message_id) = message.and_then(|m| m.get("id")).and_then(Value::as_str) {
                events.extend(self.tracker.finalize_message(message_id));
            }
        }
        events
    }

    fn route_full_value_chunk(&mut self, scope: &str, chunk: &Value) -> Vec<StreamEvent> {
        let Value::Object(fields) = chunk else {
            return Vec::new();
        };
        let node = namespace::node_name_from_display(scope);
        let mut events = Vec::new();

        for channel in self.config.channels.iter().filter(|c| c.delivery_mode == DeliveryMode::FullValue) {
            let Some(value) = fields.get(&channel.key) else {
                continue;
            };
            if !channel.passes_filter(value) {
                warn!(channel = %channel.key, scope, "channel filter rejected a value");
                continue;
            }
            let observation = self.channel_engine.observe_full_value(scope, &channel.key, value);

            match channel.kind {
                ChannelKind::Message => {
                    events.extend(handle_message_channel(scope, &channel.key, &observation, &mut self.dedup, &mut self.tracker));
                }
                ChannelKind::Artifact => events.push(StreamEvent::Artifact {
                    scope: scope.to_string(),
                    node: node.clone(),
                    channel: channel.key.clone(),
                    artifact_type: channel.artifact_type.clone().unwrap_or_default(),
                    payload: observation.value,
                    delta: observation.delta,
                }),
                ChannelKind::Generic => events.push(StreamEvent::ChannelValue {
                    scope: scope.to_string(),
                    node: node.clone(),
                    channel: channel.key.clone(),
                    value: observation.value,
                    delta: observation.delta,
                }),
            }
        }
        events
    }

    fn route_delta_chunk(&mut self, scope: &str, chunk: &Value) -> Vec<StreamEvent> {
        let Value::Object(by_node) = chunk else {
            return Vec::new();
        };
        let node = namespace::node_name_from_display(scope);
        let mut events = Vec::new();

        for node_deltas in by_node.values() {
            let Value::Object(deltas) = node_deltas else {
                continue;
            };
            for channel in self.config.channels.iter().filter(|c| c.delivery_mode == DeliveryMode::DeltaOnly) {
                let Some(delta) = deltas.get(&channel.key) else {
                    continue;
                };
                if !channel.passes_filter(delta) {
                    warn!(channel = %channel.key, scope, "channel filter rejected a value");
                    continue;
                }
                match channel.kind {
                    ChannelKind::Artifact => events.push(StreamEvent::Artifact {
                        scope: scope.to_string(),
                        node: node.clone(),
                        channel: channel.key.clone(),
                        artifact_type: channel.artifact_type.clone().unwrap_or_default(),
                        payload: delta.clone(),
                        delta: Some(delta.clone()),
                    }),
                    _ => events.push(StreamEvent::ChannelUpdate {
                        scope: scope.to_string(),
                        node: node.clone(),
                        channel: channel.key.clone(),
                        delta: delta.clone(),
                    }),
                }
            }
        }
        events
    }

}

fn pick_default_mode(modes: &HashSet<StreamMode>) -> StreamMode {
    for candidate in [StreamMode::Values, StreamMode::Updates, StreamMode::Messages] {
        if modes.contains(&candidate) {
            return candidate;
        }
    }
    StreamMode::Values
}
