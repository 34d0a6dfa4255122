//! Wire encodings for stream events.
//!
//! The pipeline yields typed `StreamEvent`s; sinks pick one of these framings.
//! Each function produces exactly one frame per event so transports never
//! merge or split events.

use serde::{Deserialize, Serialize};
use strand_protocol::{Envelope, StreamEvent};

/// Output framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Server-sent events: `event:` name plus one `data:` line.
    #[default]
    Sse,
    /// WebSocket text message: the event wrapped in a session envelope.
    Ws,
    /// One bare event object per line.
    Jsonl,
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sse => write!(f, "sse"),
            Self::Ws => write!(f, "ws"),
            Self::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// One SSE frame, terminated by a blank line.
pub fn sse_frame(event: &StreamEvent) -> serde_json::Result<String> {
    let data = serde_json::to_string(event)?;
    Ok(format!("event: {}\ndata: {}\n\n", event.name(), data))
}

/// WebSocket text payload for `event` in `session_id`.
pub fn ws_message(session_id: &str, event: &StreamEvent) -> serde_json::Result<String> {
    serde_json::to_string(&Envelope::new(session_id, event.clone()))
}

/// Encode `event` in `format`. Line-based formats include the trailing
/// newline.
pub fn encode(format: WireFormat, session_id: &str, event: &StreamEvent) -> serde_json::Result<String> {
    match format {
        WireFormat::Sse => sse_frame(event),
        WireFormat::Ws => ws_message(session_id, event).map(|mut line| {
            line.push('\n');
            line
        }),
        WireFormat::Jsonl => serde_json::to_string(event).map(|mut line| {
            line.push('\n');
            line
        }),
    }
}
