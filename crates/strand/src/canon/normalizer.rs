//! Stateful provider-to-canonical mapping for one session.

use std::collections::HashSet;

use strand_protocol::{CanonicalMessage, ContentPart, Role};

use super::ProviderMessage;

/// Maps provider messages of one session onto canonical messages.
///
/// Holds the per-session state translation needs: the id of the message
/// currently streaming and which messages already had their text delivered as
/// deltas (so complete messages do not repeat it).
#[derive(Debug)]
pub struct Normalizer {
    session_id: String,

    /// Current streaming message ID (set on message start, cleared at turn end).
    pub(super) current_message_id: Option<String>,

    /// Counter for generating deterministic message IDs within a session.
    message_counter: u64,

    /// Message ids whose text arrived as deltas during the current turn.
    pub(super) streamed: HashSet<String>,

    /// Whether any text streamed during the current turn.
    pub(super) streaming_occurred: bool,
}

impl Normalizer {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            current_message_id: None,
            message_counter: 0,
            streamed: HashSet::new(),
            streaming_occurred: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Map one provider message. Returns `None` when there is nothing to render.
    pub fn normalize(&mut self, message: &ProviderMessage) -> Option<CanonicalMessage> {
        let canonical = match message {
            ProviderMessage::Claude(msg) => self.translate_claude(msg),
            ProviderMessage::Pi(event) => self.translate_pi(event),
            ProviderMessage::Raw(line) => self.translate_raw(line),
        }?;
        (!canonical.is_empty()).then_some(canonical)
    }

    fn translate_raw(&mut self, line: &str) -> Option<CanonicalMessage> {
        if line.trim().is_empty() {
            return None;
        }
        tracing::debug!(session_id = %self.session_id, "passing through unrecognized message");
        let id = self.next_message_id();
        Some(self.message(id, Role::Assistant).with_part(ContentPart::raw(line)))
    }

    pub(super) fn message(&self, id: String, role: Role) -> CanonicalMessage {
        CanonicalMessage::new(id, self.session_id.clone(), role)
    }

    pub(super) fn next_message_id(&mut self) -> String {
        self.message_counter += 1;
        format!("msg_{}", self.message_counter)
    }

    /// Get the current message ID, or generate one if not set.
    pub(super) fn ensure_message_id(&mut self) -> String {
        if let Some(ref id) = self.current_message_id {
            id.clone()
        } else {
            let id = self.next_message_id();
            self.current_message_id = Some(id.clone());
            id
        }
    }

    /// Forget per-turn state.
    pub(super) fn end_turn(&mut self) {
        self.current_message_id = None;
        self.streamed.clear();
        self.streaming_occurred = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::ProviderFamily;

    #[test]
    fn test_raw_pass_through() {
        let mut normalizer = Normalizer::new("ses_1");
        let msg = normalizer
            .normalize(&ProviderMessage::parse_line(ProviderFamily::Claude, "garbage"))
            .unwrap();
        assert_eq!(msg.session_id, "ses_1");
        assert_eq!(msg.parts, vec![ContentPart::raw("garbage")]);

        assert!(normalizer.normalize(&ProviderMessage::Raw("  ".into())).is_none());
    }

    #[test]
    fn test_message_ids_are_deterministic() {
        let mut normalizer = Normalizer::new("s");
        assert_eq!(normalizer.ensure_message_id(), "msg_1");
        assert_eq!(normalizer.ensure_message_id(), "msg_1");
        normalizer.end_turn();
        assert_eq!(normalizer.ensure_message_id(), "msg_2");
    }
}
