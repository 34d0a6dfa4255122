//! Shared builders for pipeline integration tests.
#![allow(dead_code)]

use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use strand::augment::{AugmentContext, AugmentGenerator};
use strand::canon::{ProviderFamily, ProviderMessage};
use strand::config::PipelineConfig;
use strand::protocol::{Augment, CompletedBlock, ControlKind, StreamEvent, ToolCall};

/// Decode one Claude stream-json value the way the source adapter would.
pub fn claude(value: Value) -> ProviderMessage {
    ProviderMessage::parse_line(ProviderFamily::Claude, &value.to_string())
}

pub fn pi(value: Value) -> ProviderMessage {
    ProviderMessage::parse_line(ProviderFamily::Pi, &value.to_string())
}

pub fn message_start(id: &str) -> ProviderMessage {
    claude(json!({
        "type": "stream_event",
        "event": {"type": "message_start", "message": {"id": id}}
    }))
}

pub fn text_delta(text: &str) -> ProviderMessage {
    claude(json!({
        "type": "stream_event",
        "event": {
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": text}
        }
    }))
}

pub fn tool_use(message_id: &str, id: &str, name: &str, input: Value) -> ProviderMessage {
    claude(json!({
        "type": "assistant",
        "message": {
            "id": message_id,
            "role": "assistant",
            "content": [{"type": "tool_use", "id": id, "name": name, "input": input}]
        }
    }))
}

pub fn tool_result(id: &str, content: Value) -> ProviderMessage {
    claude(json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{"type": "tool_result", "tool_use_id": id, "content": content}]
        }
    }))
}

pub fn turn_done() -> ProviderMessage {
    claude(json!({"type": "result", "subtype": "success", "is_error": false, "result": "ok"}))
}

pub fn turn_failed(message: &str) -> ProviderMessage {
    claude(json!({"type": "result", "subtype": "error_during_execution", "is_error": true, "result": message}))
}

/// Config with coalescing off and heartbeats far away.
pub fn quiet_config() -> PipelineConfig {
    PipelineConfig {
        coalesce_window_ms: 0,
        heartbeat_interval_secs: 3600,
        ..PipelineConfig::default()
    }
}

/// Collect every event except heartbeats.
pub async fn collect(events: impl Stream<Item = StreamEvent>) -> Vec<StreamEvent> {
    events.filter(|event| futures::future::ready(!event.is_heartbeat())).collect().await
}

pub fn augmented(events: &[StreamEvent]) -> Vec<(&CompletedBlock, Option<&Augment>)> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Augmented { block, augment } => Some((block, augment.as_ref())),
            _ => None,
        })
        .collect()
}

pub fn controls(events: &[StreamEvent]) -> Vec<ControlKind> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Control { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect()
}

/// Generator that sleeps before answering, tagging the augment with the
/// tool-use id.
pub struct Sleepy(pub Duration);

impl AugmentGenerator for Sleepy {
    fn generate(&self, call: &ToolCall, _ctx: &AugmentContext) -> Augment {
        std::thread::sleep(self.0);
        Augment::plain(call.id.clone(), "sleepy")
    }
}
