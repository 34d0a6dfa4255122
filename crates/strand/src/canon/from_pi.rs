//! Pi RPC events to canonical messages.
//!
//! One Pi event produces at most one canonical message. `agent_end` is the
//! authoritative end of the turn; its message list is only used for text when
//! nothing streamed during the turn.

use strand_protocol::{CanonicalMessage, ContentPart, Role};

use super::pi::{AgentMessage, AssistantMessageEvent, ContentBlock, PiEvent};
use super::{Normalizer, terminate_block};

impl Normalizer {
    pub(super) fn translate_pi(&mut self, event: &PiEvent) -> Option<CanonicalMessage> {
        match event {
            PiEvent::AgentStart => {
                self.streaming_occurred = false;
                None
            }
            PiEvent::AgentEnd { messages } => Some(self.on_agent_end(messages)),
            PiEvent::MessageStart { message } => {
                if message.as_ref().is_some_and(|m| m.role() == Role::Assistant) {
                    let id = self.next_message_id();
                    self.current_message_id = Some(id);
                }
                None
            }
            PiEvent::MessageUpdate {
                assistant_message_event,
            } => self.on_message_update(assistant_message_event),
            PiEvent::MessageEnd { .. } => {
                self.current_message_id = None;
                None
            }
            PiEvent::ToolExecutionStart {
                tool_call_id,
                tool_name,
                args,
            } => {
                // Usually a repeat of the preceding toolcall_end; the detector
                // ignores duplicate tool-use ids.
                let id = self.ensure_message_id();
                Some(self.message(id, Role::Assistant).with_part(ContentPart::tool_use(
                    tool_call_id,
                    tool_name,
                    args.clone(),
                )))
            }
            PiEvent::ToolExecutionEnd {
                tool_call_id,
                result,
                is_error,
                ..
            } => {
                let id = self.next_message_id();
                Some(self.message(id, Role::User).with_part(ContentPart::tool_result(
                    tool_call_id,
                    result.content.clone(),
                    *is_error,
                )))
            }
            PiEvent::Unknown => None,
        }
    }

    fn on_message_update(&mut self, event: &AssistantMessageEvent) -> Option<CanonicalMessage> {
        match event {
            AssistantMessageEvent::TextDelta { delta, .. } => {
                let id = self.ensure_message_id();
                self.streaming_occurred = true;
                Some(self.message(id, Role::Assistant).with_part(ContentPart::text(delta)))
            }
            AssistantMessageEvent::ToolcallEnd { tool_call, .. } => {
                let id = self.ensure_message_id();
                Some(self.message(id, Role::Assistant).with_part(ContentPart::tool_use(
                    &tool_call.id,
                    &tool_call.name,
                    tool_call.arguments.clone(),
                )))
            }
            AssistantMessageEvent::Error { reason, error } => {
                let detail = match error {
                    Some(serde_json::Value::String(s)) => format!("{reason}: {s}"),
                    Some(other) if !other.is_null() => format!("{reason}: {other}"),
                    _ => reason.clone(),
                };
                let id = self.ensure_message_id();
                Some(self.message(id, Role::Error).with_part(ContentPart::text(detail)))
            }
            AssistantMessageEvent::ThinkingDelta { .. }
            | AssistantMessageEvent::Done { .. }
            | AssistantMessageEvent::Other => None,
        }
    }

    fn on_agent_end(&mut self, messages: &[AgentMessage]) -> CanonicalMessage {
        let id = self.next_message_id();
        let mut canonical = self.message(id, Role::Result);

        // Without streaming the turn's assistant text has not been seen yet.
        if !self.streaming_occurred {
            for message in messages.iter().filter(|m| m.role() == Role::Assistant) {
                for block in message.blocks() {
                    if let ContentBlock::Text { text } = block {
                        canonical = canonical.with_part(ContentPart::text(terminate_block(&text)));
                    }
                }
            }
        }

        self.end_turn();
        canonical.finalizing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::{ProviderFamily, ProviderMessage};

    fn normalize_lines(normalizer: &mut Normalizer, lines: &[&str]) -> Vec<CanonicalMessage> {
        lines
            .iter()
            .filter_map(|line| {
                normalizer.normalize(&ProviderMessage::parse_line(ProviderFamily::Pi, line))
            })
            .collect()
    }

    #[test]
    fn test_streaming_turn() {
        let mut normalizer = Normalizer::new("ses");
        let out = normalize_lines(
            &mut normalizer,
            &[
                r#"{"type":"agent_start"}"#,
                r#"{"type":"message_start","message":{"role":"assistant","content":[]}}"#,
                r#"{"type":"message_update","assistantMessageEvent":{"type":"text_delta","contentIndex":0,"delta":"Reading"}}"#,
                r#"{"type":"message_update","assistantMessageEvent":{"type":"toolcall_end","contentIndex":1,"toolCall":{"id":"c1","name":"read","arguments":{"path":"a.rs"}}}}"#,
                r#"{"type":"message_end","message":{"role":"assistant","content":[]}}"#,
                r#"{"type":"tool_execution_end","toolCallId":"c1","toolName":"read","result":{"content":[{"type":"text","text":"fn a() {}"}]},"isError":false}"#,
                r#"{"type":"agent_end","messages":[{"role":"assistant","content":"Reading"}]}"#,
            ],
        );

        assert_eq!(out.len(), 4);
        assert_eq!(out[0].text(), "Reading");
        assert_eq!(out[0].id, out[1].id);
        assert!(matches!(&out[1].parts[0], ContentPart::ToolUse { id, .. } if id == "c1"));
        assert!(matches!(&out[2].parts[0], ContentPart::ToolResult { tool_use_id, .. } if tool_use_id == "c1"));
        assert_eq!(out[3].role, Role::Result);
        assert!(out[3].is_final);
        assert!(out[3].parts.is_empty());
    }

    #[test]
    fn test_agent_end_without_streaming_carries_text() {
        let mut normalizer = Normalizer::new("ses");
        let out = normalize_lines(
            &mut normalizer,
            &[
                r#"{"type":"agent_start"}"#,
                r#"{"type":"agent_end","messages":[{"role":"user","content":"hi"},{"role":"assistant","content":[{"type":"text","text":"Hello!"}]}]}"#,
            ],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text(), "Hello!\n\n");
        assert!(out[0].is_final);
    }

    #[test]
    fn test_error_event() {
        let mut normalizer = Normalizer::new("ses");
        let out = normalize_lines(
            &mut normalizer,
            &[
                r#"{"type":"message_update","assistantMessageEvent":{"type":"error","reason":"error","error":"overloaded"}}"#,
            ],
        );
        assert_eq!(out[0].role, Role::Error);
        assert_eq!(out[0].text(), "error: overloaded");
        assert!(!out[0].is_final);
    }
}
