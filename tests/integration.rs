//! Black-box end-to-end scenarios against the public API only (§8).

use futures::stream;
use futures::StreamExt;
use serde_json::json;

use graph_streams::{ChannelConfig, ProcessorConfig, StreamEvent, StreamProcessor, TokenStreamConfig};

fn ok(value: serde_json::Value) -> std::result::Result<serde_json::Value, String> {
    Ok(value)
}

#[tokio::test]
async fn scenario_cross_mode_dedup() {
    let config = ProcessorConfig::builder()
        .channel(ChannelConfig::messages("messages"))
        .token_streaming(TokenStreamConfig::enable_all())
        .build()
        .unwrap();
    let processor = StreamProcessor::new(config).unwrap();

    let raw = vec![
        ok(json!([{ "id": "m1", "content": "Hello " }, {}])),
        ok(json!([{ "id": "m1", "content": "world" }, {}])),
        ok(json!([{ "id": "m1", "content": "!" }, {}])),
        ok(json!({ "messages": [{ "id": "m1", "content": "Hello world!" }] })),
    ];
    let events: Vec<_> = processor.run(stream::iter(raw)).collect().await;

    let token_events = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::TokenStream { .. }))
        .count();
    let message_received = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::MessageReceived { .. }))
        .count();

    assert_eq!(token_events, 3);
    assert_eq!(message_received, 0, "m1 was already observed via token mode");
}

#[tokio::test]
async fn scenario_tool_call_reconstruction() {
    let config = ProcessorConfig::builder()
        .token_streaming(TokenStreamConfig {
            include_tool_calls: true,
            ..TokenStreamConfig::enable_all()
        })
        .build()
        .unwrap();
    let processor = StreamProcessor::new(config).unwrap();

    let chunk = |args: &str, id: Option<&str>, name: Option<&str>| {
        let mut tc = json!({ "index": 0, "args": args, "type": "tool_call_chunk" });
        if let Some(id) = id {
            tc["id"] = json!(id);
        }
        if let Some(name) = name {
            tc["name"] = json!(name);
        }
        ok(json!([
            { "id": "m2", "tool_call_chunks": [tc] },
            {}
        ]))
    };

    let raw = vec![
        chunk("", Some("c1"), Some("think")),
        chunk(r#"{"q":""#, None, None),
        chunk(r#"hello"}"#, None, None),
    ];
    let events: Vec<_> = processor.run(stream::iter(raw)).collect().await;

    let statuses: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ToolCall { status, .. } => Some(format!("{status:?}")),
            _ => None,
        })
        .collect();

    assert_eq!(statuses, vec!["ArgsStarted", "ArgsStreaming", "ArgsReady"]);

    let ready = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::ToolCall {
                status: graph_streams::ToolCallEventStatus::ArgsReady,
                parsed_args,
                ..
            } => parsed_args.clone(),
            _ => None,
        })
        .unwrap();
    assert_eq!(ready, json!({ "q": "hello" }));
}

#[tokio::test]
async fn scenario_namespace_filter() {
    let config = ProcessorConfig::builder()
        .token_streaming(TokenStreamConfig {
            enabled_namespaces: std::collections::HashSet::from(["clarify:*".to_string()]),
            excluded_namespaces: std::collections::HashSet::from(["clarify:internal".to_string()]),
            ..Default::default()
        })
        .build()
        .unwrap();
    let processor = StreamProcessor::new(config).unwrap();

    let token = |scope: Vec<&str>, id: &str| {
        ok(json!([
            { "id": id, "content": "x" },
            { "scope": scope }
        ]))
    };

    // Scope tuples are flattened (type, id) pairs, so an excluded pattern
    // of "clarify:internal" requires a four-component tuple, not the
    // three-component shorthand — see DESIGN.md for this correction.
    let raw = vec![
        token(vec!["clarify", "t1"], "m1"),
        token(vec!["clarify", "t1", "validator", "t2"], "m2"),
        token(vec!["clarify", "t1", "internal", "t3"], "m3"),
        token(vec!["other", "t4"], "m4"),
    ];
    let events: Vec<_> = processor.run(stream::iter(raw)).collect().await;

    let scopes: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::TokenStream { scope, .. } => Some(scope.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(scopes, vec!["clarify:t1", "clarify:t1:validator:t2"]);
}

#[tokio::test]
async fn scenario_unknown_raw_shape_terminates_with_error_event() {
    let config = ProcessorConfig::builder().build().unwrap();
    let processor = StreamProcessor::new(config).unwrap();

    let raw = vec![
        ok(json!({ "counter": 1 })),
        ok(json!([{ "not": "a scope" }, "updates", { "counter": 2 }])),
        // Unreachable: the stream already terminated on the previous element.
        ok(json!({ "counter": 3 })),
    ];
    let events: Vec<_> = processor.run(stream::iter(raw)).collect().await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        StreamEvent::Error { kind, .. } if kind == "raw_shape_unknown"
    ));
}

#[tokio::test]
async fn empty_scope_tuple_produces_main_scope() {
    let config = ProcessorConfig::builder()
        .channel(ChannelConfig::generic("counter"))
        .build()
        .unwrap();
    let processor = StreamProcessor::new(config).unwrap();

    let raw = vec![ok(json!({ "counter": 1 }))];
    let events: Vec<_> = processor.run(stream::iter(raw)).collect().await;

    match &events[0] {
        StreamEvent::ChannelValue { scope, .. } => assert_eq!(scope, "main"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn channel_filter_rejecting_every_value_yields_no_events_for_that_channel() {
    let channel = ChannelConfig::generic("secret").with_filter(std::sync::Arc::new(|_: &serde_json::Value| false));
    let config = ProcessorConfig::builder().channel(channel).build().unwrap();
    let processor = StreamProcessor::new(config).unwrap();

    let raw = vec![ok(json!({ "secret": 1 })), ok(json!({ "secret": 2 }))];
    let events: Vec<_> = processor.run(stream::iter(raw)).collect().await;
    assert!(events.is_empty());
}
