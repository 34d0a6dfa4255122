//! Write augments: highlighted content of a file write.

use strand_protocol::{Augment, ToolCall};

use super::highlight::{render_code, truncate_at_char_boundary};
use super::language::{extension, language_for_path};
use super::{AugmentContext, failed_tool, file_path, string_input};

const CONTENT_KEYS: &[&str] = &["content", "file_text", "text"];

/// Content the call writes, if present and a string.
pub(super) fn written_content(call: &ToolCall) -> Option<&str> {
    if call.failed() {
        return None;
    }
    string_input(&call.input, CONTENT_KEYS)
}

pub fn compute_write_augment(call: &ToolCall, ctx: &AugmentContext) -> Augment {
    if let Some(plain) = failed_tool(call) {
        return plain;
    }
    let Some(content) = string_input(&call.input, CONTENT_KEYS) else {
        tracing::warn!(tool = %call.name, tool_use_id = %call.id, "write without string content");
        return Augment::plain(call.input.to_string(), "missing or non-string content");
    };
    let path = file_path(call);

    let (retained, truncated) = truncate_at_char_boundary(content, ctx.limits.write_limit_bytes);
    let language = path.and_then(language_for_path);
    let ext = path.and_then(extension);
    let highlighted_html = render_code(
        retained,
        language.as_deref(),
        ext.as_deref(),
        &ctx.limits.theme,
    );

    Augment::Write {
        highlighted_html,
        language,
        truncated,
        file_path: path.map(str::to_string),
    }
}
