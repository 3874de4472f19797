//! Token streamer (§3.5, §4.6): turns TOKEN-mode `(message, metadata)`
//! chunks into `TokenStream` events, and forwards any embedded tool-call
//! chunks to the [`ToolCallTracker`].

use std::collections::HashMap;

use serde_json::Value;

use crate::events::StreamEvent;
use crate::namespace::{self, TokenStreamConfig};
use crate::tool_calls::ToolCallTracker;

/// Per-`"{scope}:{task_id or 'default'}"` bucket, independently
/// accumulating per message id within that bucket (§3.5, Open Question 3).
#[derive(Debug, Default)]
pub struct TokenStreamer {
    config: TokenStreamConfig,
    accumulators: HashMap<(String, String), String>,
}

impl TokenStreamer {
    pub fn new(config: TokenStreamConfig) -> Self {
        Self {
            config,
            accumulators: HashMap::new(),
        }
    }

    /// Process one TOKEN-mode chunk, of the `{"message": .., "metadata": ..}`
    /// shape produced by [`crate::raw::parse_raw`].
    pub fn process(&mut self, scope: &str, chunk: &Value, tracker: &mut ToolCallTracker) -> Vec<StreamEvent> {
        if !self.config.is_scope_eligible(scope) {
            return Vec::new();
        }

        let message = chunk.get("message").cloned().unwrap_or(Value::Null);
        let metadata = chunk.get("metadata").cloned().unwrap_or(Value::Null);

        let tags = string_list(metadata.get("tags")).unwrap_or_default();
        if !self.config.passes_tag_filter(&tags) {
            return Vec::new();
        }

        let Some(message_id) = message.get("id").and_then(Value::as_str) else {
            return Vec::new();
        };

        let mut events = Vec::new();

        if self.config.include_tool_calls {
            if let Some(Value::Array(chunks)) = message.get("tool_call_chunks") {
                for tc in chunks {
                    let Some(index) = tc.get("index").and_then(Value::as_u64) else {
                        continue;
                    };
                    let id = tc.get("id").and_then(Value::as_str);
                    let name = tc.get("name").and_then(Value::as_str);
                    let args = tc.get("args").and_then(Value::as_str).unwrap_or("");
                    events.extend(tracker.handle_chunk(message_id, index, id, name, args, scope));
                }
            }
        }

        if let Some(content) = message.get("content").and_then(Value::as_str) {
            if !content.is_empty() {
                let task_id = metadata.get("task_id").and_then(Value::as_str).unwrap_or("default");
                let bucket_key = (format!("{scope}:{task_id}"), message_id.to_string());
                let buffer = self.accumulators.entry(bucket_key).or_default();
                buffer.push_str(content);
                let message_tag = tags.first().cloned();
                events.push(StreamEvent::TokenStream {
                    scope: scope.to_string(),
                    node: namespace::node_name_from_display(scope),
                    message_id: message_id.to_string(),
                    content_delta: content.to_string(),
                    accumulated_content: buffer.clone(),
                    message_tag,
                });
            }
        }

        events
    }

    /// Drop all accumulators (§3.9 session reset).
    pub fn reset(&mut self) {
        self.accumulators.clear();
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(message_id: &str, content: &str) -> Value {
        json!({
            "message": { "id": message_id, "content": content },
            "metadata": {}
        })
    }

    #[test]
    fn scenario_simple_token_stream_from_spec() {
        let mut streamer = TokenStreamer::new(TokenStreamConfig::enable_all());
        let mut tracker = ToolCallTracker::new();

        let e1 = streamer.process("main", &chunk("m1", "Hello "), &mut tracker);
        let e2 = streamer.process("main", &chunk("m1", "world"), &mut tracker);
        let e3 = streamer.process("main", &chunk("m1", "!"), &mut tracker);

        let deltas: Vec<_> = [e1, e2, e3]
            .into_iter()
            .flatten()
            .map(|ev| match ev {
                StreamEvent::TokenStream {
                    content_delta,
                    accumulated_content,
                    ..
                } => (content_delta, accumulated_content),
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();

        assert_eq!(
            deltas,
            vec![
                ("Hello ".to_string(), "Hello ".to_string()),
                ("world".to_string(), "Hello world".to_string()),
                ("!".to_string(), "Hello world!".to_string()),
            ]
        );
    }

    #[test]
    fn ineligible_scope_is_dropped() {
        let cfg = TokenStreamConfig {
            enabled_namespaces: std::collections::HashSet::from(["clarify:*".to_string()]),
            ..Default::default()
        };
        let mut streamer = TokenStreamer::new(cfg);
        let mut tracker = ToolCallTracker::new();
        let events = streamer.process("other:t4", &chunk("m1", "hi"), &mut tracker);
        assert!(events.is_empty());
    }

    #[test]
    fn scenario_namespace_filter_from_spec() {
        let cfg = TokenStreamConfig {
            enabled_namespaces: std::collections::HashSet::from(["clarify:*".to_string()]),
            excluded_namespaces: std::collections::HashSet::from(["clarify:internal".to_string()]),
            ..Default::default()
        };
        let mut streamer = TokenStreamer::new(cfg);
        let mut tracker = ToolCallTracker::new();

        assert_eq!(streamer.process("clarify:t1", &chunk("m1", "a"), &mut tracker).len(), 1);
        assert_eq!(
            streamer
                .process("clarify:t1:validator:t2", &chunk("m2", "b"), &mut tracker)
                .len(),
            1
        );
        assert!(streamer
            .process("clarify:t1:internal:t2", &chunk("m3", "c"), &mut tracker)
            .is_empty());
        assert!(streamer.process("other:t4", &chunk("m4", "d"), &mut tracker).is_empty());
    }

    #[test]
    fn tool_call_chunks_forward_to_tracker() {
        let mut streamer = TokenStreamer::new(TokenStreamConfig {
            include_tool_calls: true,
            ..TokenStreamConfig::enable_all()
        });
        let mut tracker = ToolCallTracker::new();
        let chunk = json!({
            "message": {
                "id": "m2",
                "tool_call_chunks": [{"index": 0, "id": "c1", "name": "think", "args": ""}]
            },
            "metadata": {}
        });
        let events = streamer.process("main", &chunk, &mut tracker);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::ToolCall { .. }));
    }

    #[test]
    fn tag_filter_drops_untagged_content() {
        let cfg = TokenStreamConfig {
            message_tags: Some(std::collections::HashSet::from(["final".to_string()])),
            ..TokenStreamConfig::enable_all()
        };
        let mut streamer = TokenStreamer::new(cfg);
        let mut tracker = ToolCallTracker::new();
        let events = streamer.process("main", &chunk("m1", "hi"), &mut tracker);
        assert!(events.is_empty());
    }

    #[test]
    fn reset_clears_accumulators_so_next_session_starts_fresh() {
        let mut streamer = TokenStreamer::new(TokenStreamConfig::enable_all());
        let mut tracker = ToolCallTracker::new();
        streamer.process("main", &chunk("m1", "hi"), &mut tracker);
        streamer.reset();
        let events = streamer.process("main", &chunk("m1", "there"), &mut tracker);
        match &events[0] {
            StreamEvent::TokenStream { accumulated_content, .. } => {
                assert_eq!(accumulated_content, "there");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
