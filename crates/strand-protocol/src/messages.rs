//! Canonical message model.
//!
//! Every provider shape (Claude SDK stream-json, Pi RPC events, ...) is mapped
//! into a `CanonicalMessage` at the boundary. Downstream stages only ever see
//! this representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Role
// ============================================================================

/// Canonical message role.
///
/// Maps from various agent-specific terms:
/// - `user`, `human`, `tool`, `toolResult` -> `User`
/// - `assistant`, `agent`, `ai` -> `Assistant`
/// - `system` -> `System`
/// - `result` -> `Result` (end of turn)
/// - `error` -> `Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
    Result,
    Error,
}

impl Role {
    /// Parse a role string from any agent format.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "assistant" | "agent" | "ai" | "bot" => Self::Assistant,
            "system" => Self::System,
            "result" => Self::Result,
            "error" => Self::Error,
            // Tool results travel back to the model as user turns.
            _ => Self::User,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Result => write!(f, "result"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ============================================================================
// Content parts
// ============================================================================

/// One ordered piece of a canonical message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Assistant text (usually a streaming delta).
    Text {
        delta: String,
        /// Set when the text is an opaque pass-through of an unrecognized
        /// provider message.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        raw: bool,
    },

    /// A tool invocation requested by the agent.
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },

    /// The result of a tool invocation.
    ToolResult {
        #[serde(rename = "toolUseId")]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(rename = "isError", default)]
        is_error: bool,
    },
}

impl ContentPart {
    /// Create a text delta part.
    pub fn text(delta: impl Into<String>) -> Self {
        Self::Text {
            delta: delta.into(),
            raw: false,
        }
    }

    /// Create an opaque pass-through text part.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Text {
            delta: text.into(),
            raw: true,
        }
    }

    /// Create a tool-use part.
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Create a tool-result part.
    pub fn tool_result(tool_use_id: impl Into<String>, content: Value, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
            is_error,
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// A provider-agnostic representation of one inbound agent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Stable message ID.
    pub id: String,
    /// Session this message belongs to.
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub role: Role,
    /// Ordered content parts.
    #[serde(default)]
    pub parts: Vec<ContentPart>,
    /// True when this message completes the current turn.
    #[serde(rename = "isFinal", default)]
    pub is_final: bool,
    /// True when the message originates from a subagent.
    #[serde(default)]
    pub subagent: bool,
}

impl CanonicalMessage {
    pub fn new(id: impl Into<String>, session_id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            role,
            parts: Vec::new(),
            is_final: false,
            subagent: false,
        }
    }

    /// Append a content part.
    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Mark the message as the end of the turn.
    pub fn finalizing(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Mark the message as originating from a subagent.
    pub fn from_subagent(mut self, subagent: bool) -> Self {
        self.subagent = subagent;
        self
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True when the message carries nothing to render and does not end the turn.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty() && !self.is_final && self.role != Role::Error
    }
}
