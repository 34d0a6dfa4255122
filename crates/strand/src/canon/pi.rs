//! Pi RPC event types.
//!
//! Pi streams one JSON event per line on stdout while in `--mode rpc`. Only the
//! events that carry renderable content are modelled in detail; lifecycle
//! events that the pipeline ignores collapse into `Unknown`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strand_protocol::Role;

/// Events streamed from pi during agent operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PiEvent {
    /// Agent begins processing.
    AgentStart,
    /// Agent completes the prompt.
    AgentEnd {
        #[serde(default)]
        messages: Vec<AgentMessage>,
    },
    /// Message begins.
    MessageStart {
        #[serde(default)]
        message: Option<AgentMessage>,
    },
    /// Streaming update.
    MessageUpdate {
        #[serde(rename = "assistantMessageEvent")]
        assistant_message_event: AssistantMessageEvent,
    },
    /// Message completes.
    MessageEnd {
        #[serde(default)]
        message: Option<AgentMessage>,
    },
    /// Tool begins execution.
    ToolExecutionStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default)]
        args: Value,
    },
    /// Tool completes.
    ToolExecutionEnd {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        result: ToolResult,
        #[serde(rename = "isError", default)]
        is_error: bool,
    },
    /// Turn boundaries, compaction, retries, extension UI, ...
    #[serde(other)]
    Unknown,
}

/// Streaming delta events for assistant messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantMessageEvent {
    TextDelta {
        #[serde(rename = "contentIndex", default)]
        content_index: usize,
        delta: String,
    },
    ThinkingDelta {
        #[serde(rename = "contentIndex", default)]
        content_index: usize,
        delta: String,
    },
    ToolcallEnd {
        #[serde(rename = "contentIndex", default)]
        content_index: usize,
        #[serde(rename = "toolCall")]
        tool_call: ToolCall,
    },
    Done {
        #[serde(default)]
        reason: String,
    },
    Error {
        #[serde(default)]
        reason: String,
        #[serde(default)]
        error: Option<Value>,
    },
    /// start/end markers and tool-call argument deltas.
    #[serde(other)]
    Other,
}

/// Agent message (user, assistant, or tool result).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
    #[serde(rename = "stopReason", default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    ToolCall(ToolCall),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AgentMessage {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    /// Typed content blocks. A plain string becomes a single text block.
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match &self.content {
            Value::String(text) => vec![ContentBlock::Text { text: text.clone() }],
            Value::Array(items) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}
