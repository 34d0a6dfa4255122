//! Property tests for block detection over arbitrary message sequences, and
//! for the full pipeline over arbitrary chunkings of one transcript.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;
use strand::blocks::{BlockDetector, Detected};
use strand::canon::ProviderMessage;
use strand::config::PipelineConfig;
use strand::protocol::{
    BlockKind, CanonicalMessage, ContentPart, DegradeReason, Finalization, Role, StreamEvent,
};
use strand::stream::StreamAugmenter;
use tokio_util::sync::CancellationToken;

mod common;
use common::{Sleepy, collect, message_start, text_delta, tool_result, tool_use, turn_done};

#[derive(Debug, Clone)]
enum Op {
    Text(String),
    ToolUse(u8),
    ToolResult(u8),
    EndTurn,
    Error,
}

fn fragment() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "abc", " ", "\n", "\n\n", "`", "```", "```rust\n", "~~~\n", "x = 1;", "- item\n", "\t",
    ])
    .prop_map(str::to_string)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => prop::collection::vec(fragment(), 1..4).prop_map(|parts| Op::Text(parts.concat())),
        2 => (0u8..4).prop_map(Op::ToolUse),
        2 => (0u8..5).prop_map(Op::ToolResult),
        1 => Just(Op::EndTurn),
        1 => Just(Op::Error),
    ]
}

fn message(op: &Op) -> CanonicalMessage {
    let assistant = CanonicalMessage::new("msg", "ses", Role::Assistant);
    match op {
        Op::Text(text) => assistant.with_part(ContentPart::text(text.clone())),
        Op::ToolUse(n) => assistant.with_part(ContentPart::tool_use(
            format!("toolu_{n}"),
            "Bash",
            json!({"command": "true"}),
        )),
        Op::ToolResult(n) => CanonicalMessage::new("msg", "ses", Role::User)
            .with_part(ContentPart::tool_result(format!("toolu_{n}"), json!("ok"), false)),
        Op::EndTurn => CanonicalMessage::new("msg", "ses", Role::Result).finalizing(),
        Op::Error => CanonicalMessage::new("msg", "ses", Role::Error)
            .with_part(ContentPart::text("boom"))
            .finalizing(),
    }
}

fn run(ops: &[Op]) -> (Vec<Detected>, BlockDetector) {
    let mut detector = BlockDetector::new();
    let mut out = Vec::new();
    for op in ops {
        out.extend(detector.process(&message(op)));
    }
    out.extend(detector.close(DegradeReason::StreamClosed));
    (out, detector)
}

proptest! {
    #[test]
    fn prop_blocks_finalize_at_most_once(ops in prop::collection::vec(op(), 0..40)) {
        let (out, _) = run(&ops);
        let mut seen = HashSet::new();
        for detected in &out {
            if let Detected::Completed(block) = detected {
                prop_assert!(seen.insert(block.block_id.clone()), "finalized twice: {}", block.block_id);
            }
        }
    }

    #[test]
    fn prop_no_deltas_after_finalization(ops in prop::collection::vec(op(), 0..40)) {
        let (out, _) = run(&ops);
        let mut finalized = HashSet::new();
        for detected in &out {
            match detected {
                Detected::Completed(block) => {
                    finalized.insert(block.block_id.clone());
                }
                Detected::Delta { block_id, .. } => {
                    prop_assert!(!finalized.contains(block_id), "delta after finalization: {}", block_id);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn prop_close_leaves_nothing_open(ops in prop::collection::vec(op(), 0..40)) {
        let (out, detector) = run(&ops);
        prop_assert_eq!(detector.open_blocks(), 0);
        prop_assert!(!detector.in_turn());

        // Every started tool reached a final state.
        let completed: HashSet<_> = out
            .iter()
            .filter_map(|d| match d {
                Detected::Completed(block) => Some(block.block_id.clone()),
                _ => None,
            })
            .collect();
        for detected in &out {
            if let Detected::ToolStarted { block_id, .. } = detected {
                prop_assert!(completed.contains(block_id));
            }
        }
    }

    #[test]
    fn prop_block_content_matches_its_deltas(ops in prop::collection::vec(op(), 0..40)) {
        let (out, _) = run(&ops);
        let mut streamed: HashMap<String, String> = Default::default();
        for detected in &out {
            match detected {
                Detected::Delta { block_id, text } => {
                    streamed.entry(block_id.clone()).or_default().push_str(text);
                }
                Detected::Completed(block) if block.tool_call.is_none() => {
                    if let Some(text) = streamed.get(&block.block_id) {
                        prop_assert_eq!(text, &block.raw_content);
                    }
                }
                _ => {}
            }
        }
    }
}

const TEXT_SEGMENTS: [&str; 3] = [
    "Intro paragraph.\n\n```rust\nfn main() {}\n```\nMore text",
    "After.\n\n~~~\ncode\n~~~\n",
    "Tail",
];

/// Split `text` into pieces whose sizes cycle through `sizes`.
fn chunked(text: &str, sizes: &[usize]) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    let mut sizes = sizes.iter().cycle();
    while !rest.is_empty() {
        let size = sizes.next().copied().unwrap_or(rest.len()).clamp(1, rest.len());
        let (head, tail) = rest.split_at(size);
        pieces.push(head.to_string());
        rest = tail;
    }
    pieces
}

/// Text, a slow tool, more text, a read, and a trailing paragraph. `sizes`
/// controls how the text deltas are split.
fn transcript(sizes: &[usize]) -> Vec<ProviderMessage> {
    let text = |segment: &str| -> Vec<ProviderMessage> {
        chunked(segment, sizes).iter().map(|piece| text_delta(piece)).collect()
    };
    let mut messages = vec![message_start("msg_1")];
    messages.extend(text(TEXT_SEGMENTS[0]));
    messages.push(tool_use("msg_1", "toolu_1", "Slow", json!({})));
    messages.push(tool_result("toolu_1", json!("done")));
    messages.push(message_start("msg_2"));
    messages.extend(text(TEXT_SEGMENTS[1]));
    messages.push(tool_use("msg_2", "toolu_2", "Read", json!({"file_path": "a.rs"})));
    messages.push(tool_result("toolu_2", json!("fn a() {}\n")));
    messages.push(message_start("msg_3"));
    messages.extend(text(TEXT_SEGMENTS[2]));
    messages.push(turn_done());
    messages
}

fn run_pipeline(
    messages: Vec<ProviderMessage>,
    coalesce_window_ms: u64,
    max_in_flight: usize,
) -> Vec<StreamEvent> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let config = PipelineConfig {
            coalesce_window_ms,
            max_in_flight,
            heartbeat_interval_secs: 3600,
            ..PipelineConfig::default()
        };
        let augmenter = StreamAugmenter::new("ses_prop", config)
            .unwrap()
            .with_generator("Slow", Arc::new(Sleepy(Duration::from_millis(3))));
        collect(augmenter.run(futures::stream::iter(messages), CancellationToken::new())).await
    })
}

/// Block shape as the client sees it, independent of delta boundaries.
fn block_shapes(events: &[StreamEvent]) -> Vec<(String, BlockKind, String, Finalization)> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Augmented { block, .. } => Some((
                block.block_id.clone(),
                block.kind,
                block.raw_content.clone(),
                block.finalization,
            )),
            _ => None,
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_pipeline_is_chunking_invariant(
        sizes in prop::collection::vec(1usize..8, 1..40),
        coalesce_window_ms in 0u64..=20,
        max_in_flight in 1usize..=3,
    ) {
        let events = run_pipeline(transcript(&sizes), coalesce_window_ms, max_in_flight);

        let mut augmented = HashSet::new();
        let mut announced = HashSet::new();
        for event in &events {
            match event {
                StreamEvent::Augmented { block, .. } => {
                    prop_assert!(
                        augmented.insert(block.block_id.clone()),
                        "augmented twice: {}", block.block_id
                    );
                }
                StreamEvent::Pending { block_id, .. } => {
                    prop_assert!(
                        !augmented.contains(block_id),
                        "pending after augmented: {}", block_id
                    );
                    announced.insert(block_id.clone());
                }
                StreamEvent::ToolStarted { block_id, .. } => {
                    announced.insert(block_id.clone());
                }
                _ => {}
            }
        }
        for block_id in &announced {
            prop_assert!(augmented.contains(block_id), "never augmented: {}", block_id);
        }

        // Same blocks, in the same order, as one delta per segment.
        let reference = run_pipeline(transcript(&[usize::MAX]), 0, 4);
        prop_assert_eq!(block_shapes(&events), block_shapes(&reference));
    }
}
