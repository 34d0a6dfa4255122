//! Completed block types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a logical block within one session stream.
pub type BlockId = String;

/// What kind of content a block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// A markdown paragraph (or run of non-blank lines).
    Prose,
    /// A fenced code section including its fence lines.
    FencedCode,
    /// A tool invocation, bounded by its result.
    ToolInvocation,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prose => write!(f, "prose"),
            Self::FencedCode => write!(f, "fenced_code"),
            Self::ToolInvocation => write!(f, "tool_invocation"),
        }
    }
}

/// Why a block was finalized without observing its structural boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// The turn ended while the block was still open; content may be truncated.
    EndOfTurn,
    /// A tool result arrived for a tool-use id that was never opened.
    UnknownToolUse,
    /// The provider reported an error while the block was open.
    StreamError,
    /// The upstream message stream ended while the block was open.
    StreamClosed,
    /// A tool invocation started before this block was closed.
    Interrupted,
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfTurn => write!(f, "end_of_turn"),
            Self::UnknownToolUse => write!(f, "unknown_tool_use"),
            Self::StreamError => write!(f, "stream_error"),
            Self::StreamClosed => write!(f, "stream_closed"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// How a block reached its final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Finalization {
    /// A structural boundary was observed.
    #[default]
    Clean,
    /// The block was forced closed; rendering is best-effort.
    Degraded { reason: DegradeReason },
}

impl Finalization {
    pub fn degraded(reason: DegradeReason) -> Self {
        Self::Degraded { reason }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Output of a finished tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    #[serde(default)]
    pub content: Value,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

/// A tool invocation with its result, if one arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutcome>,
}

impl ToolCall {
    /// String field of the tool input, if present.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(Value::as_str)
    }

    /// First string field present among `keys`.
    pub fn input_str_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.input_str(key))
    }

    /// True when the tool reported an error.
    pub fn failed(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.is_error)
    }
}

/// Immutable snapshot of a finalized block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedBlock {
    #[serde(rename = "blockId")]
    pub block_id: BlockId,
    pub kind: BlockKind,
    /// Accumulated text for prose/code blocks; empty for tool invocations.
    #[serde(rename = "rawContent", default)]
    pub raw_content: String,
    #[serde(rename = "toolCall", default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub subagent: bool,
    #[serde(default)]
    pub finalization: Finalization,
}

impl CompletedBlock {
    pub fn is_degraded(&self) -> bool {
        self.finalization.is_degraded()
    }

    /// Tool name when this block is a tool invocation.
    pub fn tool_name(&self) -> Option<&str> {
        self.tool_call.as_ref().map(|call| call.name.as_str())
    }
}
