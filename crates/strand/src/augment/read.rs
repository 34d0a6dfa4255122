//! Read augments: highlighted content returned by a file read.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use strand_protocol::{Augment, ToolCall};

use super::highlight::{render_code, truncate_at_char_boundary};
use super::language::{extension, language_for_path};
use super::{AugmentContext, failed_tool, file_path};

/// `cat -n` style gutter: right-aligned line number then a tab or arrow.
static LINE_NUMBER_GUTTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)(?:\t|→)").expect("valid regex"));

/// Text of a tool result. Results are either a string or a list of content
/// blocks; non-text blocks are skipped.
pub fn tool_result_text(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let texts: Vec<String> = items.iter().filter_map(tool_result_text).collect();
            (!texts.is_empty()).then(|| texts.join("\n"))
        }
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str).is_some_and(|t| t != "text") {
                return None;
            }
            map.get("text")
                .or_else(|| map.get("content"))
                .and_then(tool_result_text)
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Strip line-number gutters, but only when every non-empty line carries
/// one and the numbers count up by one.
pub fn strip_line_numbers(text: &str) -> String {
    if text.is_empty() || !numbered_consecutively(text) {
        return text.to_string();
    }
    text.split_inclusive('\n')
        .map(|line| LINE_NUMBER_GUTTER.replace(line, ""))
        .collect()
}

fn numbered_consecutively(text: &str) -> bool {
    let mut expected: Option<u64> = None;
    for line in text.lines().filter(|line| !line.is_empty()) {
        let Some(number) = LINE_NUMBER_GUTTER
            .captures(line)
            .and_then(|caps| caps[1].parse::<u64>().ok())
        else {
            return false;
        };
        if expected.is_some_and(|n| n != number) {
            return false;
        }
        expected = number.checked_add(1);
    }
    expected.is_some()
}

pub fn compute_read_augment(call: &ToolCall, ctx: &AugmentContext) -> Augment {
    if let Some(plain) = failed_tool(call) {
        return plain;
    }
    let Some(result) = call.result.as_ref() else {
        return Augment::plain("", "read finished without a result");
    };
    let Some(text) = tool_result_text(&result.content) else {
        tracing::warn!(tool = %call.name, tool_use_id = %call.id, "read result has no text");
        return Augment::plain(result.content.to_string(), "read result has no text");
    };
    let content = strip_line_numbers(&text);
    let path = file_path(call);

    let (retained, truncated) = truncate_at_char_boundary(&content, ctx.limits.read_limit_bytes);
    let language = path.and_then(language_for_path);
    let ext = path.and_then(extension);
    let highlighted_html = render_code(
        retained,
        language.as_deref(),
        ext.as_deref(),
        &ctx.limits.theme,
    );

    Augment::Read {
        highlighted_html,
        language,
        truncated,
        file_path: path.map(str::to_string),
    }
}
