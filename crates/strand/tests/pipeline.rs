//! End-to-end pipeline behavior: ordering, forced finalization, coalescing,
//! cancellation and upstream termination.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::json;
use strand::augment::{AugmentContext, AugmentGenerator};
use strand::config::PipelineConfig;
use strand::protocol::{
    Augment, BlockKind, ControlKind, DegradeReason, Finalization, StreamEvent, ToolCall,
};
use strand::stream::{CLOSED_MID_TURN, MemoryIndex, StreamAugmenter};
use tokio_util::sync::CancellationToken;

mod common;
use common::*;

fn augmenter(config: PipelineConfig) -> StreamAugmenter {
    StreamAugmenter::new("ses_test", config).unwrap()
}

#[tokio::test]
async fn test_slow_augment_does_not_reorder_output() {
    let input = futures::stream::iter(vec![
        message_start("msg_1"),
        tool_use("msg_1", "toolu_a", "Slow", json!({})),
        tool_result("toolu_a", json!("a")),
        tool_use("msg_2", "toolu_b", "Fast", json!({})),
        tool_result("toolu_b", json!("b")),
        turn_done(),
    ]);
    let events = augmenter(quiet_config())
        .with_generator("Slow", Arc::new(Sleepy(Duration::from_millis(200))))
        .with_generator("Fast", Arc::new(Sleepy(Duration::ZERO)))
        .run(input, CancellationToken::new());
    let events = collect(events).await;

    let order: Vec<&str> = augmented(&events)
        .iter()
        .map(|(block, _)| block.tool_call.as_ref().unwrap().id.as_str())
        .collect();
    assert_eq!(order, vec!["toolu_a", "toolu_b"]);

    // Both augments were computed, and the turn ended after them.
    for (_, augment) in augmented(&events) {
        assert!(matches!(augment, Some(Augment::Plain { note, .. }) if note == "sleepy"));
    }
    assert_eq!(
        controls(&events),
        vec![ControlKind::Connected, ControlKind::Done]
    );
    assert_eq!(events.last(), Some(&StreamEvent::control(ControlKind::Done)));
}

#[tokio::test]
async fn test_open_fence_is_forced_at_end_of_turn() {
    let input = futures::stream::iter(vec![
        message_start("msg_1"),
        text_delta("Here:\n\n```rust\n"),
        text_delta("fn main() {\n"),
        text_delta("    todo!()"),
        turn_done(),
    ]);
    let events = collect(augmenter(quiet_config()).run(input, CancellationToken::new())).await;

    let blocks = augmented(&events);
    let fenced: Vec<_> = blocks
        .iter()
        .filter(|(block, _)| block.kind == BlockKind::FencedCode)
        .collect();
    assert_eq!(fenced.len(), 1);
    let (block, augment) = fenced[0];
    assert_eq!(
        block.finalization,
        Finalization::degraded(DegradeReason::EndOfTurn)
    );
    assert!(block.raw_content.starts_with("```rust\n"));
    assert!(block.raw_content.contains("todo!()"));
    assert!(augment.is_none());

    let finalized_at = events
        .iter()
        .position(|event| {
            event.name() == "augmented" && event.block_id() == Some(block.block_id.as_str())
        })
        .unwrap();
    assert!(
        events[finalized_at..]
            .iter()
            .all(|event| !matches!(event, StreamEvent::Pending { .. })),
        "pending text after finalization: {events:?}"
    );
    assert_eq!(events.last(), Some(&StreamEvent::control(ControlKind::Done)));
}

#[tokio::test(start_paused = true)]
async fn test_deltas_inside_window_coalesce() {
    let (tx, rx) = futures::channel::mpsc::unbounded();
    let config = PipelineConfig {
        coalesce_window_ms: 50,
        heartbeat_interval_secs: 3600,
        ..PipelineConfig::default()
    };
    let events = augmenter(config).run(rx, CancellationToken::new());
    futures::pin_mut!(events);

    tx.unbounded_send(message_start("msg_1")).unwrap();
    for text in ["a", "b", "c", "d", "e"] {
        tx.unbounded_send(text_delta(text)).unwrap();
    }

    assert_eq!(
        events.next().await,
        Some(StreamEvent::control(ControlKind::Connected))
    );
    let Some(StreamEvent::Pending {
        block_id,
        delta_text,
    }) = events.next().await
    else {
        panic!("expected one coalesced pending event");
    };
    assert_eq!(delta_text, "abcde");

    drop(tx);
    let rest: Vec<_> = events.collect().await;
    assert!(matches!(
        &rest[0],
        StreamEvent::Augmented { block, .. }
            if block.block_id == block_id
                && block.finalization == Finalization::degraded(DegradeReason::StreamClosed)
    ));
    assert_eq!(rest.last(), Some(&StreamEvent::error(CLOSED_MID_TURN)));
}

#[tokio::test]
async fn test_cancel_discards_in_flight_augments() {
    let input = futures::stream::iter(vec![
        tool_use("msg_1", "toolu_a", "Slow", json!({})),
        tool_result("toolu_a", json!("a")),
        turn_done(),
    ]);
    let cancel = CancellationToken::new();
    let events = augmenter(quiet_config())
        .with_generator("Slow", Arc::new(Sleepy(Duration::from_millis(300))))
        .run(input, cancel.clone());
    futures::pin_mut!(events);

    assert_eq!(
        events.next().await,
        Some(StreamEvent::control(ControlKind::Connected))
    );
    assert!(matches!(
        events.next().await,
        Some(StreamEvent::ToolStarted { name, .. }) if name == "Slow"
    ));

    cancel.cancel();
    assert_eq!(events.next().await, None);
}

#[tokio::test]
async fn test_provider_error_finalizes_open_blocks_first() {
    let input = futures::stream::iter(vec![
        message_start("msg_1"),
        text_delta("```\nlet x = 1;\n"),
        turn_failed("model overloaded"),
    ]);
    let events = collect(augmenter(quiet_config()).run(input, CancellationToken::new())).await;

    let blocks = augmented(&events);
    assert_eq!(blocks.len(), 1);
    assert_eq!(
        blocks[0].0.finalization,
        Finalization::degraded(DegradeReason::StreamError)
    );

    let error_at = events
        .iter()
        .position(|event| {
            matches!(
                event,
                StreamEvent::Control {
                    kind: ControlKind::Error,
                    message: Some(message),
                } if message == "model overloaded"
            )
        })
        .expect("error control event");
    let block_at = events
        .iter()
        .position(|event| event.name() == "augmented")
        .unwrap();
    assert!(block_at < error_at);
}

#[tokio::test]
async fn test_upstream_close_mid_turn_reports_error() {
    let input = futures::stream::iter(vec![message_start("msg_1"), text_delta("half a sentence")]);
    let events = collect(augmenter(quiet_config()).run(input, CancellationToken::new())).await;

    let blocks = augmented(&events);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].0.kind, BlockKind::Prose);
    assert_eq!(blocks[0].0.raw_content, "half a sentence");
    assert_eq!(
        blocks[0].0.finalization,
        Finalization::degraded(DegradeReason::StreamClosed)
    );
    assert_eq!(events.last(), Some(&StreamEvent::error(CLOSED_MID_TURN)));
}

#[tokio::test]
async fn test_upstream_close_between_turns_is_quiet() {
    let input = futures::stream::iter(vec![
        message_start("msg_1"),
        text_delta("All done.\n\n"),
        turn_done(),
    ]);
    let events = collect(augmenter(quiet_config()).run(input, CancellationToken::new())).await;
    assert_eq!(
        controls(&events),
        vec![ControlKind::Connected, ControlKind::Done]
    );
}

#[tokio::test]
async fn test_every_block_reaches_the_index() {
    let index = Arc::new(MemoryIndex::new());
    let input = futures::stream::iter(vec![
        message_start("msg_1"),
        text_delta("First paragraph.\n\nSecond"),
        tool_use("msg_1", "toolu_1", "Bash", json!({"command": "ls"})),
        tool_result("toolu_1", json!("Cargo.toml\n")),
        turn_done(),
    ]);
    let augmenter = augmenter(quiet_config()).with_index(index.clone());
    let telemetry = augmenter.telemetry().clone();
    let events = collect(augmenter.run(input, CancellationToken::new())).await;

    let emitted = augmented(&events).len();
    assert_eq!(emitted, 3);
    assert_eq!(index.len().await, emitted);
    assert_eq!(telemetry.snapshot().blocks, emitted as u64);
    assert_eq!(telemetry.snapshot().messages, 5);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_flow_without_content() {
    let (_tx, rx) = futures::channel::mpsc::unbounded();
    let config = PipelineConfig {
        heartbeat_interval_secs: 1,
        ..PipelineConfig::default()
    };
    let events = augmenter(config).run(rx, CancellationToken::new());
    futures::pin_mut!(events);

    assert_eq!(
        events.next().await,
        Some(StreamEvent::control(ControlKind::Connected))
    );
    for _ in 0..3 {
        let event = events.next().await.unwrap();
        assert!(event.is_heartbeat(), "{event:?}");
    }
}

/// Generator that blocks until the test releases it.
struct Gated(std::sync::Mutex<std::sync::mpsc::Receiver<()>>);

impl AugmentGenerator for Gated {
    fn generate(&self, call: &ToolCall, _ctx: &AugmentContext) -> Augment {
        if let Ok(gate) = self.0.lock() {
            let _ = gate.recv();
        }
        Augment::plain(call.id.clone(), "gated")
    }
}

/// Next event, moving the paused clock forward while waiting. Blocking-pool
/// work keeps the runtime from auto-advancing.
async fn next_advancing<S>(events: &mut S) -> Option<StreamEvent>
where
    S: Stream<Item = StreamEvent> + Unpin,
{
    tokio::select! {
        biased;
        event = events.next() => event,
        _ = async {
            loop {
                tokio::time::advance(Duration::from_millis(250)).await;
            }
        } => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_flow_while_augments_are_saturated() {
    let (release, gate) = std::sync::mpsc::channel();
    let config = PipelineConfig {
        max_in_flight: 1,
        coalesce_window_ms: 0,
        heartbeat_interval_secs: 1,
        ..PipelineConfig::default()
    };
    let input = futures::stream::iter(vec![
        tool_use("msg_1", "toolu_a", "Gated", json!({})),
        tool_result("toolu_a", json!("a")),
        tool_use("msg_2", "toolu_b", "Gated", json!({})),
        tool_result("toolu_b", json!("b")),
        turn_done(),
    ]);
    let events = augmenter(config)
        .with_generator("Gated", Arc::new(Gated(std::sync::Mutex::new(gate))))
        .run(input, CancellationToken::new());
    futures::pin_mut!(events);

    let mut heartbeats = 0;
    let mut last = tokio::time::Instant::now();
    while heartbeats < 3 {
        let event = next_advancing(&mut events).await.expect("stream ended early");
        let gap = last.elapsed();
        assert!(gap < Duration::from_millis(1500), "output silent for {gap:?}");
        last = tokio::time::Instant::now();
        match &event {
            StreamEvent::Augmented { .. } => panic!("augment settled before release: {event:?}"),
            // Input is held while the only slot is busy.
            StreamEvent::ToolStarted { block_id, .. } => assert_eq!(block_id, "toolu_a"),
            _ if event.is_heartbeat() => heartbeats += 1,
            _ => {}
        }
    }

    release.send(()).unwrap();
    release.send(()).unwrap();
    let mut rest = Vec::new();
    while let Some(event) = next_advancing(&mut events).await {
        if !event.is_heartbeat() {
            rest.push(event);
        }
    }
    let order: Vec<&str> = augmented(&rest)
        .iter()
        .map(|(block, _)| block.block_id.as_str())
        .collect();
    assert_eq!(order, vec!["toolu_a", "toolu_b"]);
    assert_eq!(rest.last(), Some(&StreamEvent::control(ControlKind::Done)));
}
