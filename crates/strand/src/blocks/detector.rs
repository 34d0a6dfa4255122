//! Incremental block boundary detection for one session.
//!
//! Text is consumed line by line. Each lane (main agent, subagent) owns one
//! text slot; tool invocations are tracked separately by tool-use id, so a
//! tool can stay open while text keeps streaming.
//!
//! ```text
//! Empty -> Accumulating -> Stable -> Finalized
//!   blank line / fence close / fence opener / tool use / tool result
//!   end of turn, provider error, upstream close (forced)
//! ```

use std::collections::{HashSet, VecDeque};

use serde_json::Value;
use strand_protocol::{
    BlockId, BlockKind, CanonicalMessage, CompletedBlock, ContentPart, DegradeReason,
    Finalization, Role, ToolCall, ToolOutcome,
};

use super::fence::{Fence, is_blank, may_become_boundary};

/// How many finalized tool-use ids are remembered for deduplication.
const FINALIZED_TOOLS_RETAINED: usize = 4096;

/// What the detector observed while processing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Detected {
    /// Text attributed to an open block.
    Delta { block_id: BlockId, text: String },
    /// A tool invocation was opened.
    ToolStarted {
        block_id: BlockId,
        name: String,
        input: Value,
    },
    /// A block reached its final state. Emitted once per block id.
    Completed(CompletedBlock),
    /// The provider reported an error. Open blocks were finalized first.
    Failed { message: String },
    /// The turn ended. Open blocks were finalized first.
    TurnEnded,
}

/// Why open blocks are being forced closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Force {
    /// A tool invocation ended the preceding text content block.
    ToolBoundary,
    EndOfTurn,
    /// Provider error or upstream termination.
    Abort(DegradeReason),
}

impl Force {
    fn finalization(self, kind: BlockKind) -> Finalization {
        match (self, kind) {
            (Force::ToolBoundary | Force::EndOfTurn, BlockKind::Prose) => Finalization::Clean,
            (Force::ToolBoundary, _) => Finalization::degraded(DegradeReason::Interrupted),
            (Force::EndOfTurn, _) => Finalization::degraded(DegradeReason::EndOfTurn),
            (Force::Abort(reason), _) => Finalization::degraded(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Main = 0,
    Subagent = 1,
}

impl Lane {
    fn of(subagent: bool) -> Self {
        if subagent { Lane::Subagent } else { Lane::Main }
    }
}

/// Accumulator for a prose or fenced-code block.
#[derive(Debug)]
struct OpenBlock {
    id: BlockId,
    seq: u64,
    kind: BlockKind,
    content: String,
    fence: Option<Fence>,
}

#[derive(Debug, Default)]
struct TextSlot {
    /// Incomplete current line.
    partial: String,
    /// Bytes of `partial` already attributed to the open block.
    emitted: usize,
    open: Option<OpenBlock>,
}

#[derive(Debug)]
struct OpenTool {
    seq: u64,
    call: ToolCall,
    subagent: bool,
}

/// Recently finalized tool-use ids, oldest evicted first. Text block ids come
/// from a counter and never repeat, so only tools are tracked.
#[derive(Debug, Default)]
struct FinalizedTools {
    order: VecDeque<BlockId>,
    ids: HashSet<BlockId>,
}

impl FinalizedTools {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns false when `id` was already finalized.
    fn insert(&mut self, id: &str) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > FINALIZED_TOOLS_RETAINED
            && let Some(oldest) = self.order.pop_front()
        {
            self.ids.remove(&oldest);
        }
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Block detection state machine for one session.
#[derive(Debug, Default)]
pub struct BlockDetector {
    lanes: [TextSlot; 2],
    /// Open tool invocations in arrival order.
    tools: Vec<OpenTool>,
    finalized: FinalizedTools,
    next_block: u64,
    next_seq: u64,
    in_turn: bool,
}

impl BlockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when content arrived since the last end of turn.
    pub fn in_turn(&self) -> bool {
        self.in_turn
    }

    /// Number of blocks currently open (text blocks and tools).
    pub fn open_blocks(&self) -> usize {
        self.lanes.iter().filter(|slot| slot.open.is_some()).count() + self.tools.len()
    }

    /// Process one canonical message.
    ///
    /// The message's parts are applied before any end-of-turn forcing, so a
    /// boundary inside the final message finalizes its block cleanly.
    pub fn process(&mut self, msg: &CanonicalMessage) -> Vec<Detected> {
        let mut out = Vec::new();
        let lane = Lane::of(msg.subagent);

        if msg.role == Role::Error {
            let text = msg.text();
            let message = if text.trim().is_empty() {
                "provider error".to_string()
            } else {
                text.trim().to_string()
            };
            self.force_all(Force::Abort(DegradeReason::StreamError), &mut out);
            out.push(Detected::Failed { message });
            if msg.is_final {
                self.in_turn = false;
                out.push(Detected::TurnEnded);
            }
            return out;
        }

        if !msg.parts.is_empty() {
            self.in_turn = true;
        }

        for part in &msg.parts {
            match part {
                ContentPart::Text { delta, raw } => {
                    if *raw || matches!(msg.role, Role::User | Role::System) {
                        self.standalone(delta, msg.subagent, &mut out);
                    } else {
                        self.push_text(lane, delta, &mut out);
                    }
                }
                ContentPart::ToolUse { id, name, input } => {
                    self.open_tool(lane, id, name, input, msg.subagent, &mut out);
                }
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => self.close_tool(tool_use_id, content, *is_error, msg.subagent, &mut out),
            }
        }

        if msg.is_final {
            self.force_all(Force::EndOfTurn, &mut out);
            self.in_turn = false;
            out.push(Detected::TurnEnded);
        }
        out
    }

    /// Force-finalize everything still open, degraded with `reason`. Used when
    /// the upstream ends or the pipeline is torn down.
    pub fn close(&mut self, reason: DegradeReason) -> Vec<Detected> {
        let mut out = Vec::new();
        self.force_all(Force::Abort(reason), &mut out);
        self.in_turn = false;
        out
    }

    // -- text --

    fn push_text(&mut self, lane: Lane, delta: &str, out: &mut Vec<Detected>) {
        self.lanes[lane as usize].partial.push_str(delta);

        while let Some(pos) = self.lanes[lane as usize].partial.find('\n') {
            let slot = &mut self.lanes[lane as usize];
            let line: String = slot.partial.drain(..=pos).collect();
            let emitted = std::mem::take(&mut slot.emitted);
            self.process_line(lane, &line, emitted, out);
        }

        // Attribute as much of the incomplete line as can no longer change
        // blocks.
        if may_become_boundary(&self.lanes[lane as usize].partial) {
            return;
        }
        if self.lanes[lane as usize].open.is_none() {
            let block = self.new_text_block(BlockKind::Prose, None);
            self.lanes[lane as usize].open = Some(block);
        }
        let slot = &mut self.lanes[lane as usize];
        if slot.emitted < slot.partial.len() {
            let text = slot.partial[slot.emitted..].to_string();
            slot.emitted = slot.partial.len();
            if let Some(block) = slot.open.as_mut() {
                block.content.push_str(&text);
                out.push(Detected::Delta {
                    block_id: block.id.clone(),
                    text,
                });
            }
        }
    }

    /// Apply one complete line. The first `emitted` bytes were already added
    /// to the open block.
    fn process_line(&mut self, lane: Lane, line: &str, emitted: usize, out: &mut Vec<Detected>) {
        let open_kind = self.lanes[lane as usize].open.as_ref().map(|b| b.kind);

        match open_kind {
            Some(BlockKind::FencedCode) => {
                let closes = self.lanes[lane as usize]
                    .open
                    .as_ref()
                    .and_then(|b| b.fence.as_ref())
                    .is_some_and(|fence| fence.is_close(line));
                self.append(lane, line, emitted, out);
                if closes {
                    self.finalize_text(lane, Finalization::Clean, out);
                }
            }
            Some(_) => {
                if is_blank(line) {
                    self.finalize_text(lane, Finalization::Clean, out);
                } else if let Some(fence) = Fence::parse_open(line) {
                    self.finalize_text(lane, Finalization::Clean, out);
                    self.open_fence(lane, fence, line, out);
                } else {
                    self.append(lane, line, emitted, out);
                }
            }
            None => {
                if is_blank(line) {
                    return;
                }
                if let Some(fence) = Fence::parse_open(line) {
                    self.open_fence(lane, fence, line, out);
                } else {
                    let block = self.new_text_block(BlockKind::Prose, None);
                    self.lanes[lane as usize].open = Some(block);
                    self.append(lane, line, emitted, out);
                }
            }
        }
    }

    fn open_fence(&mut self, lane: Lane, fence: Fence, line: &str, out: &mut Vec<Detected>) {
        let block = self.new_text_block(BlockKind::FencedCode, Some(fence));
        self.lanes[lane as usize].open = Some(block);
        self.append(lane, line, 0, out);
    }

    fn append(&mut self, lane: Lane, line: &str, emitted: usize, out: &mut Vec<Detected>) {
        let Some(block) = self.lanes[lane as usize].open.as_mut() else {
            return;
        };
        // The already-emitted prefix is in the block's content.
        let rest = line.get(emitted..).unwrap_or_default();
        if rest.is_empty() {
            return;
        }
        block.content.push_str(rest);
        out.push(Detected::Delta {
            block_id: block.id.clone(),
            text: rest.to_string(),
        });
    }

    fn new_text_block(&mut self, kind: BlockKind, fence: Option<Fence>) -> OpenBlock {
        self.next_block += 1;
        OpenBlock {
            id: format!("blk_{}", self.next_block),
            seq: self.bump_seq(),
            kind,
            content: String::new(),
            fence,
        }
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn finalize_text(&mut self, lane: Lane, finalization: Finalization, out: &mut Vec<Detected>) {
        let Some(block) = self.lanes[lane as usize].open.take() else {
            return;
        };
        self.emit(
            CompletedBlock {
                block_id: block.id,
                kind: block.kind,
                raw_content: block.content,
                tool_call: None,
                subagent: lane == Lane::Subagent,
                finalization,
            },
            out,
        );
    }

    /// Treat the incomplete line as complete. Used when the text content block
    /// ends without a trailing newline.
    fn flush_partial(&mut self, lane: Lane, out: &mut Vec<Detected>) {
        let slot = &mut self.lanes[lane as usize];
        if slot.partial.is_empty() {
            return;
        }
        let line = std::mem::take(&mut slot.partial);
        let emitted = std::mem::take(&mut slot.emitted);
        self.process_line(lane, &line, emitted, out);
    }

    /// Text outside the assistant's markdown stream (raw pass-through, user
    /// echoes) becomes a block of its own.
    fn standalone(&mut self, text: &str, subagent: bool, out: &mut Vec<Detected>) {
        if text.trim().is_empty() {
            return;
        }
        let block = self.new_text_block(BlockKind::Prose, None);
        self.emit(
            CompletedBlock {
                block_id: block.id,
                kind: BlockKind::Prose,
                raw_content: text.to_string(),
                tool_call: None,
                subagent,
                finalization: Finalization::Clean,
            },
            out,
        );
    }

    // -- tools --

    fn open_tool(
        &mut self,
        lane: Lane,
        id: &str,
        name: &str,
        input: &Value,
        subagent: bool,
        out: &mut Vec<Detected>,
    ) {
        if self.finalized.contains(id) || self.tools.iter().any(|t| t.call.id == id) {
            tracing::debug!(tool_use_id = id, "ignoring duplicate tool use");
            return;
        }

        // A tool use ends the preceding text content block.
        self.flush_partial(lane, out);
        if let Some(kind) = self.lanes[lane as usize].open.as_ref().map(|b| b.kind) {
            self.finalize_text(lane, Force::ToolBoundary.finalization(kind), out);
        }

        let seq = self.bump_seq();
        self.tools.push(OpenTool {
            seq,
            call: ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                input: input.clone(),
                result: None,
            },
            subagent,
        });
        out.push(Detected::ToolStarted {
            block_id: id.to_string(),
            name: name.to_string(),
            input: input.clone(),
        });
    }

    fn close_tool(
        &mut self,
        tool_use_id: &str,
        content: &Value,
        is_error: bool,
        subagent: bool,
        out: &mut Vec<Detected>,
    ) {
        if self.finalized.contains(tool_use_id) {
            tracing::debug!(tool_use_id, "ignoring duplicate tool result");
            return;
        }
        let outcome = ToolOutcome {
            content: content.clone(),
            is_error,
        };

        match self.tools.iter().position(|t| t.call.id == tool_use_id) {
            Some(index) => {
                let mut tool = self.tools.remove(index);
                tool.call.result = Some(outcome);
                self.emit(tool_block(tool.call, tool.subagent, Finalization::Clean), out);
            }
            None => {
                tracing::warn!(tool_use_id, "tool result for unknown tool use");
                let call = ToolCall {
                    id: tool_use_id.to_string(),
                    name: String::new(),
                    input: Value::Null,
                    result: Some(outcome),
                };
                self.emit(
                    tool_block(
                        call,
                        subagent,
                        Finalization::degraded(DegradeReason::UnknownToolUse),
                    ),
                    out,
                );
            }
        }
    }

    // -- forcing --

    fn force_all(&mut self, force: Force, out: &mut Vec<Detected>) {
        for lane in [Lane::Main, Lane::Subagent] {
            self.flush_partial(lane, out);
        }

        enum Item {
            Text(Lane),
            Tool(BlockId),
        }
        let mut items: Vec<(u64, Item)> = Vec::new();
        for lane in [Lane::Main, Lane::Subagent] {
            if let Some(block) = &self.lanes[lane as usize].open {
                items.push((block.seq, Item::Text(lane)));
            }
        }
        for tool in &self.tools {
            items.push((tool.seq, Item::Tool(tool.call.id.clone())));
        }
        items.sort_by_key(|(seq, _)| *seq);

        for (_, item) in items {
            match item {
                Item::Text(lane) => {
                    if let Some(kind) = self.lanes[lane as usize].open.as_ref().map(|b| b.kind) {
                        self.finalize_text(lane, force.finalization(kind), out);
                    }
                }
                Item::Tool(id) => {
                    if let Some(index) = self.tools.iter().position(|t| t.call.id == id) {
                        let tool = self.tools.remove(index);
                        let finalization = force.finalization(BlockKind::ToolInvocation);
                        self.emit(tool_block(tool.call, tool.subagent, finalization), out);
                    }
                }
            }
        }
    }

    fn emit(&mut self, block: CompletedBlock, out: &mut Vec<Detected>) {
        if block.tool_call.is_some() && !self.finalized.insert(&block.block_id) {
            tracing::debug!(block_id = %block.block_id, "block already finalized");
            return;
        }
        out.push(Detected::Completed(block));
    }
}

fn tool_block(call: ToolCall, subagent: bool, finalization: Finalization) -> CompletedBlock {
    CompletedBlock {
        block_id: call.id.clone(),
        kind: BlockKind::ToolInvocation,
        raw_content: String::new(),
        tool_call: Some(call),
        subagent,
        finalization,
    }
}
