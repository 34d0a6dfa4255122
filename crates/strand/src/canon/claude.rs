//! Claude SDK stream-json message types.
//!
//! One JSON object per line on the agent's stdout when run with
//! `--output-format stream-json` (and optionally `--include-partial-messages`
//! for `stream_event` deltas).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level stream-json message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeMessage {
    /// Session init and status notices.
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// A complete assistant message.
    Assistant {
        message: ClaudeApiMessage,
        #[serde(default)]
        parent_tool_use_id: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// A user turn, usually carrying tool results.
    User {
        message: ClaudeApiMessage,
        #[serde(default)]
        parent_tool_use_id: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Raw API streaming event (partial messages).
    StreamEvent {
        event: ClaudeStreamEvent,
        #[serde(default)]
        parent_tool_use_id: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// End of the turn.
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Any message type not listed above.
    #[serde(other)]
    Unknown,
}

impl ClaudeMessage {
    /// Parent tool-use id for messages emitted by a subagent.
    pub fn parent_tool_use_id(&self) -> Option<&str> {
        match self {
            Self::Assistant {
                parent_tool_use_id, ..
            }
            | Self::User {
                parent_tool_use_id, ..
            }
            | Self::StreamEvent {
                parent_tool_use_id, ..
            } => parent_tool_use_id.as_deref(),
            _ => None,
        }
    }
}

/// The Messages API payload inside `assistant`/`user` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeApiMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub content: ClaudeContent,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Message content: either a plain string or a list of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeContent {
    Text(String),
    Blocks(Vec<ClaudeContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeContentBlock {
    Text {
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    /// Images, redacted thinking and anything newer.
    #[serde(other)]
    Unknown,
}

/// Streaming event wrapped by `stream_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeStreamEvent {
    MessageStart {
        message: ClaudeStreamMessageStart,
    },
    ContentBlockStart {
        index: usize,
        #[serde(default)]
        content_block: Value,
    },
    ContentBlockDelta {
        index: usize,
        delta: ClaudeDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        #[serde(default)]
        delta: Value,
    },
    MessageStop,
    #[serde(other)]
    Unknown,
}

/// The (partial) message announced by `message_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeStreamMessageStart {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        #[serde(default)]
        thinking: String,
    },
    InputJsonDelta {
        #[serde(default)]
        partial_json: String,
    },
    #[serde(other)]
    Unknown,
}
