//! Wire-ready stream events.
//!
//! Events are what the transport sink forwards to the browser, one SSE frame or
//! one WebSocket message per event. For a given session they form a total order
//! consistent with the arrival order of the provider messages that caused them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::augments::Augment;
use crate::blocks::{BlockId, CompletedBlock};

// ============================================================================
// Event envelope
// ============================================================================

/// A stream event with routing metadata, used when one sink multiplexes
/// several sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Which session this event belongs to.
    pub session_id: String,

    /// Unix ms timestamp.
    pub ts: i64,

    /// The event payload.
    #[serde(flatten)]
    pub event: StreamEvent,
}

impl Envelope {
    pub fn new(session_id: impl Into<String>, event: StreamEvent) -> Self {
        Self {
            session_id: session_id.into(),
            ts: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}

// ============================================================================
// Event payloads
// ============================================================================

/// Session lifecycle signal carried by a control event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// The pipeline is attached and streaming.
    Connected,
    /// Keep-alive, emitted independently of content.
    Heartbeat,
    /// The current turn ended.
    Done,
    /// The provider reported an error or the stream ended mid-turn.
    Error,
}

impl std::fmt::Display for ControlKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Heartbeat => write!(f, "heartbeat"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// All possible stream events, tagged by `event` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Unfinalized text for an open block. Superseded by the block's
    /// `Augmented` event.
    Pending {
        #[serde(rename = "blockId")]
        block_id: BlockId,
        #[serde(rename = "deltaText")]
        delta_text: String,
    },

    /// A tool invocation was opened; its result has not arrived yet.
    ToolStarted {
        #[serde(rename = "blockId")]
        block_id: BlockId,
        name: String,
        #[serde(default)]
        input: Value,
    },

    /// A finalized block with its augment, if one applies.
    Augmented {
        #[serde(flatten)]
        block: CompletedBlock,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        augment: Option<Augment>,
    },

    /// Session lifecycle signal.
    Control {
        kind: ControlKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl StreamEvent {
    pub fn control(kind: ControlKind) -> Self {
        Self::Control {
            kind,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Control {
            kind: ControlKind::Error,
            message: Some(message.into()),
        }
    }

    /// Block this event refers to, if any.
    pub fn block_id(&self) -> Option<&str> {
        match self {
            Self::Pending { block_id, .. } | Self::ToolStarted { block_id, .. } => Some(block_id),
            Self::Augmented { block, .. } => Some(&block.block_id),
            Self::Control { .. } => None,
        }
    }

    /// Event name, used as the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::ToolStarted { .. } => "tool_started",
            Self::Augmented { .. } => "augmented",
            Self::Control { .. } => "control",
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(
            self,
            Self::Control {
                kind: ControlKind::Heartbeat,
                ..
            }
        )
    }
}
