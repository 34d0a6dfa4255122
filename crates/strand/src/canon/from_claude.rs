//! Claude stream-json to canonical messages.

use strand_protocol::{CanonicalMessage, ContentPart, Role};

use super::claude::{
    ClaudeApiMessage, ClaudeContent, ClaudeContentBlock, ClaudeDelta, ClaudeMessage,
    ClaudeStreamEvent,
};
use super::{Normalizer, terminate_block};

impl Normalizer {
    pub(super) fn translate_claude(&mut self, msg: &ClaudeMessage) -> Option<CanonicalMessage> {
        let subagent = msg.parent_tool_use_id().is_some();
        match msg {
            ClaudeMessage::System { .. } | ClaudeMessage::Unknown => None,
            ClaudeMessage::StreamEvent { event, .. } => self.on_stream_event(event, subagent),
            ClaudeMessage::Assistant { message, .. } => {
                Some(self.on_assistant(message).from_subagent(subagent))
            }
            ClaudeMessage::User { message, .. } => {
                Some(self.on_user(message).from_subagent(subagent))
            }
            ClaudeMessage::Result {
                is_error,
                result,
                subtype,
                ..
            } => Some(self.on_result(*is_error, result.as_ref(), subtype.as_deref())),
        }
    }

    fn on_stream_event(
        &mut self,
        event: &ClaudeStreamEvent,
        subagent: bool,
    ) -> Option<CanonicalMessage> {
        match event {
            ClaudeStreamEvent::MessageStart { message } => {
                self.current_message_id = Some(match &message.id {
                    Some(id) => id.clone(),
                    None => self.next_message_id(),
                });
                None
            }
            ClaudeStreamEvent::ContentBlockDelta {
                delta: ClaudeDelta::TextDelta { text },
                ..
            } => {
                let id = self.ensure_message_id();
                self.streamed.insert(id.clone());
                self.streaming_occurred = true;
                Some(
                    self.message(id, Role::Assistant)
                        .with_part(ContentPart::text(text))
                        .from_subagent(subagent),
                )
            }
            // Thinking, tool input fragments and block markers render nothing;
            // the complete assistant message carries the tool call.
            _ => None,
        }
    }

    fn on_assistant(&mut self, message: &ClaudeApiMessage) -> CanonicalMessage {
        let id = match &message.id {
            Some(id) => id.clone(),
            None => self.ensure_message_id(),
        };
        // Text of a message that streamed as deltas was already delivered.
        let streamed = self.streamed.contains(&id);
        let mut canonical = self.message(id, Role::Assistant);

        match &message.content {
            ClaudeContent::Text(text) if !streamed => {
                canonical = canonical.with_part(ContentPart::text(terminate_block(text)));
            }
            ClaudeContent::Text(_) => {}
            ClaudeContent::Blocks(blocks) => {
                for block in blocks {
                    match block {
                        ClaudeContentBlock::Text { text } if !streamed => {
                            canonical =
                                canonical.with_part(ContentPart::text(terminate_block(text)));
                        }
                        ClaudeContentBlock::ToolUse { id, name, input } => {
                            canonical = canonical.with_part(ContentPart::tool_use(
                                id,
                                name,
                                input.clone(),
                            ));
                        }
                        ClaudeContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => {
                            canonical = canonical.with_part(ContentPart::tool_result(
                                tool_use_id,
                                content.clone(),
                                *is_error,
                            ));
                        }
                        _ => {}
                    }
                }
            }
        }
        canonical
    }

    fn on_user(&mut self, message: &ClaudeApiMessage) -> CanonicalMessage {
        let id = self.next_message_id();
        let mut canonical = self.message(id, Role::User);

        match &message.content {
            ClaudeContent::Text(text) => {
                canonical = canonical.with_part(ContentPart::text(terminate_block(text)));
            }
            ClaudeContent::Blocks(blocks) => {
                for block in blocks {
                    match block {
                        ClaudeContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => {
                            canonical = canonical.with_part(ContentPart::tool_result(
                                tool_use_id,
                                content.clone(),
                                *is_error,
                            ));
                        }
                        ClaudeContentBlock::Text { text } => {
                            canonical =
                                canonical.with_part(ContentPart::text(terminate_block(text)));
                        }
                        _ => {}
                    }
                }
            }
        }
        canonical
    }

    fn on_result(
        &mut self,
        is_error: bool,
        result: Option<&serde_json::Value>,
        subtype: Option<&str>,
    ) -> CanonicalMessage {
        let id = self.next_message_id();
        self.end_turn();

        if !is_error {
            return self.message(id, Role::Result).finalizing();
        }

        let detail = match result {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => subtype.unwrap_or("error").to_string(),
        };
        self.message(id, Role::Error)
            .with_part(ContentPart::text(detail))
            .finalizing()
    }
}
