//! Provider message normalization.
//!
//! Agent harnesses speak different line protocols. This module decodes them
//! into a closed [`ProviderMessage`] enum and maps each message onto the
//! canonical model from `strand-protocol`.
//!
//! ## Design Rules
//!
//! 1. Decoding never fails: a line that does not parse is kept as `Raw`.
//! 2. Message types a family is known to emit but that carry nothing to render
//!    (keep-alives, lifecycle notices) decode to the family's `Unknown` and
//!    normalize to `None`.
//! 3. Types nobody has seen before are passed through as raw text.

mod claude;
mod from_claude;
mod from_pi;
mod normalizer;
mod pi;

pub use claude::*;
pub use normalizer::Normalizer;
pub use pi::{AgentMessage, AssistantMessageEvent, PiEvent};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Agent protocol a session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    /// Claude SDK stream-json.
    Claude,
    /// Pi RPC events.
    Pi,
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claude => write!(f, "claude"),
            Self::Pi => write!(f, "pi"),
        }
    }
}

/// Message types that carry no renderable content.
const CLAUDE_IGNORED_TYPES: &[&str] = &[
    "keep_alive",
    "control_request",
    "control_response",
    "control_cancel_request",
];

const PI_IGNORED_TYPES: &[&str] = &[
    "response",
    "turn_start",
    "turn_end",
    "tool_execution_update",
    "auto_compaction_start",
    "auto_compaction_end",
    "auto_retry_start",
    "auto_retry_end",
    "hook_error",
    "extension_ui_request",
];

/// One decoded line from an agent process.
#[derive(Debug, Clone)]
pub enum ProviderMessage {
    Claude(ClaudeMessage),
    Pi(PiEvent),
    /// A line that could not be decoded, kept verbatim.
    Raw(String),
}

impl ProviderMessage {
    /// Decode one JSONL line. Never fails.
    pub fn parse_line(family: ProviderFamily, line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            return Self::Raw(line.to_string());
        };
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();

        match family {
            ProviderFamily::Claude => match serde_json::from_value::<ClaudeMessage>(value.clone()) {
                Ok(ClaudeMessage::Unknown) if !CLAUDE_IGNORED_TYPES.contains(&kind) => {
                    Self::Raw(line.to_string())
                }
                Ok(msg) => Self::Claude(msg),
                Err(e) => {
                    tracing::debug!(error = %e, kind, "undecodable claude message");
                    Self::Raw(line.to_string())
                }
            },
            ProviderFamily::Pi => match serde_json::from_value::<PiEvent>(value.clone()) {
                Ok(PiEvent::Unknown) if !PI_IGNORED_TYPES.contains(&kind) => {
                    Self::Raw(line.to_string())
                }
                Ok(event) => Self::Pi(event),
                Err(e) => {
                    tracing::debug!(error = %e, kind, "undecodable pi event");
                    Self::Raw(line.to_string())
                }
            },
        }
    }

    pub fn family(&self) -> Option<ProviderFamily> {
        match self {
            Self::Claude(_) => Some(ProviderFamily::Claude),
            Self::Pi(_) => Some(ProviderFamily::Pi),
            Self::Raw(_) => None,
        }
    }
}

impl From<ClaudeMessage> for ProviderMessage {
    fn from(msg: ClaudeMessage) -> Self {
        Self::Claude(msg)
    }
}

impl From<PiEvent> for ProviderMessage {
    fn from(event: PiEvent) -> Self {
        Self::Pi(event)
    }
}

/// Make a complete (non-delta) text block end with a paragraph break, so it
/// does not run into whatever text follows it.
pub(crate) fn terminate_block(text: &str) -> String {
    let mut out = text.to_string();
    if out.is_empty() || out.ends_with("\n\n") {
        return out;
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out
}
