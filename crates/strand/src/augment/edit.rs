//! Edit augments: unified diffs of file edits.

use serde_json::Value;
use similar::TextDiff;
use strand_protocol::{Augment, ToolCall};

use super::highlight::truncate_at_char_boundary;
use super::language::language_for_path;
use super::{AugmentContext, failed_tool, file_path, string_input};

const OLD_KEYS: &[&str] = &["old_string", "oldText", "old_str"];
const NEW_KEYS: &[&str] = &["new_string", "newText", "new_str"];
const CONTEXT_LINES: usize = 3;

/// One string replacement.
#[derive(Debug)]
struct EditOp<'a> {
    old: &'a str,
    new: &'a str,
    replace_all: bool,
}

/// Apply one replacement to `content`. Returns `None` when `old` does not
/// occur (an empty `old` only applies to empty content).
pub fn apply_edit(content: &str, old: &str, new: &str, replace_all: bool) -> Option<String> {
    if old.is_empty() {
        return content.is_empty().then(|| new.to_string());
    }
    if !content.contains(old) {
        return None;
    }
    Some(if replace_all {
        content.replace(old, new)
    } else {
        content.replacen(old, new, 1)
    })
}

fn edit_op(value: &Value) -> Option<EditOp<'_>> {
    Some(EditOp {
        old: string_input(value, OLD_KEYS)?,
        new: string_input(value, NEW_KEYS)?,
        replace_all: value
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Replacements requested by the call: a single edit or a `MultiEdit` list.
fn edit_ops(input: &Value) -> Option<Vec<EditOp<'_>>> {
    match input.get("edits").and_then(Value::as_array) {
        Some(edits) if !edits.is_empty() => edits.iter().map(edit_op).collect(),
        _ => edit_op(input).map(|op| vec![op]),
    }
}

fn apply_all(prior: &str, ops: &[EditOp<'_>]) -> Option<String> {
    ops.iter().try_fold(prior.to_string(), |content, op| {
        apply_edit(&content, op.old, op.new, op.replace_all)
    })
}

/// File content after the call: the explicit `after` input, or the edits
/// applied cleanly to `prior`.
pub(super) fn edited_content(call: &ToolCall, prior: Option<&str>) -> Option<String> {
    if call.failed() {
        return None;
    }
    if let Some(after) = string_input(&call.input, &["after"]) {
        return Some(after.to_string());
    }
    apply_all(prior?, &edit_ops(&call.input)?)
}

fn with_newline(s: &str) -> String {
    if s.is_empty() || s.ends_with('\n') {
        s.to_string()
    } else {
        format!("{s}\n")
    }
}

/// Before/after text to diff, or a note explaining why there is none.
fn diff_sides(call: &ToolCall, prior: Option<&str>) -> Result<(String, String), &'static str> {
    if let (Some(before), Some(after)) = (
        string_input(&call.input, &["before"]),
        string_input(&call.input, &["after"]),
    ) {
        return Ok((before.to_string(), after.to_string()));
    }

    let ops = edit_ops(&call.input).ok_or("missing or non-string old_string/new_string")?;

    if let Some(prior) = prior {
        if let Some(after) = apply_all(prior, &ops) {
            return Ok((prior.to_string(), after));
        }
        tracing::debug!(tool_use_id = %call.id, "edit does not apply to snapshot, diffing fragments");
    }

    // Fragment-only diff.
    let before = ops.iter().map(|op| with_newline(op.old)).collect();
    let after = ops.iter().map(|op| with_newline(op.new)).collect();
    Ok((before, after))
}

/// Compute the edit augment for a completed edit tool call.
pub fn compute_edit_augment(call: &ToolCall, ctx: &AugmentContext) -> Augment {
    if let Some(plain) = failed_tool(call) {
        return plain;
    }
    let path = file_path(call);

    let (before, after) = match diff_sides(call, ctx.prior_content.as_deref()) {
        Ok(sides) => sides,
        Err(note) => {
            tracing::warn!(tool = %call.name, tool_use_id = %call.id, note, "edit augment degraded");
            return Augment::plain(call.input.to_string(), note);
        }
    };

    if before.len() + after.len() > ctx.limits.diff_limit_bytes {
        tracing::warn!(
            tool_use_id = %call.id,
            bytes = before.len() + after.len(),
            limit = ctx.limits.diff_limit_bytes,
            "edit too large to diff"
        );
        let (prefix, _) = truncate_at_char_boundary(&after, ctx.limits.diff_limit_bytes);
        return Augment::plain(prefix, "edit too large to diff");
    }

    let (a, b) = match path {
        Some(p) => {
            let p = p.trim_start_matches('/');
            (format!("a/{p}"), format!("b/{p}"))
        }
        None => ("a".to_string(), "b".to_string()),
    };
    let unified_diff = TextDiff::from_lines(&before, &after)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&a, &b)
        .to_string();

    Augment::Edit {
        unified_diff,
        language: path.and_then(language_for_path),
        file_path: path.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_protocol::ToolOutcome;

    fn call(input: Value) -> ToolCall {
        ToolCall {
            id: "toolu_1".into(),
            name: "Edit".into(),
            input,
            result: None,
        }
    }

    /// Minimal unified-diff applier, enough for single-file diffs.
    fn apply_unified(before: &str, diff: &str) -> String {
        let old: Vec<&str> = before.split_inclusive('\n').collect();
        let mut out = String::new();
        let mut cursor = 0usize;
        for line in diff.split_inclusive('\n') {
            if line.starts_with("--- ") || line.starts_with("+++ ") || line.starts_with('\\') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("@@ -") {
                let start: usize = rest.split([',', ' ']).next().unwrap().parse().unwrap();
                while cursor + 1 < start {
                    out.push_str(old[cursor]);
                    cursor += 1;
                }
                continue;
            }
            match line.chars().next() {
                Some(' ') => {
                    out.push_str(&line[1..]);
                    cursor += 1;
                }
                Some('-') => cursor += 1,
                Some('+') => out.push_str(&line[1..]),
                _ => {}
            }
        }
        for rest in &old[cursor.min(old.len())..] {
            out.push_str(rest);
        }
        out
    }

    #[test]
    fn test_diff_round_trip() {
        let augment = compute_edit_augment(
            &call(json!({"file_path": "f.txt", "before": "a\nb\n", "after": "a\nc\n"})),
            &AugmentContext::default(),
        );
        let Augment::Edit {
            unified_diff,
            file_path,
            ..
        } = augment
        else {
            panic!("expected edit augment, got {augment:?}");
        };
        assert!(unified_diff.starts_with("--- a/f.txt\n+++ b/f.txt\n"));
        assert_eq!(apply_unified("a\nb\n", &unified_diff), "a\nc\n");
        assert_eq!(file_path.as_deref(), Some("f.txt"));
    }

    #[test]
    fn test_edit_applies_to_prior_content() {
        let prior = "fn main() {\n    println!(\"hi\");\n}\n".to_string();
        let ctx = AugmentContext {
            prior_content: Some(prior.clone()),
            ..Default::default()
        };
        let augment = compute_edit_augment(
            &call(json!({
                "file_path": "/repo/src/main.rs",
                "old_string": "\"hi\"",
                "new_string": "\"hello\""
            })),
            &ctx,
        );
        let Augment::Edit {
            unified_diff,
            language,
            ..
        } = augment
        else {
            panic!("expected edit augment");
        };
        assert_eq!(language.as_deref(), Some("rust"));
        assert!(unified_diff.contains("--- a/repo/src/main.rs"));
        assert_eq!(
            apply_unified(&prior, &unified_diff),
            "fn main() {\n    println!(\"hello\");\n}\n"
        );
    }

    #[test]
    fn test_multi_edit_without_prior_diffs_fragments() {
        let augment = compute_edit_augment(
            &call(json!({
                "file_path": "a.py",
                "edits": [
                    {"old_string": "x = 1", "new_string": "x = 2"},
                    {"old_string": "y = 1", "new_string": "y = 3", "replace_all": true}
                ]
            })),
            &AugmentContext::default(),
        );
        let Augment::Edit { unified_diff, .. } = augment else {
            panic!("expected edit augment");
        };
        assert!(unified_diff.contains("-x = 1\n"));
        assert!(unified_diff.contains("+y = 3\n"));
    }

    #[test]
    fn test_invalid_inputs_degrade_to_plain() {
        for input in [
            json!({"file_path": "a.rs"}),
            json!({"file_path": "a.rs", "old_string": 1, "new_string": "x"}),
            json!("not an object"),
            json!({"edits": [{"old_string": "a"}]}),
        ] {
            let augment = compute_edit_augment(&call(input), &AugmentContext::default());
            assert!(augment.is_plain(), "{augment:?}");
        }
    }

    #[test]
    fn test_failed_tool_degrades_to_plain() {
        let mut c = call(json!({"file_path": "a", "old_string": "x", "new_string": "y"}));
        c.result = Some(ToolOutcome {
            content: json!("String to replace not found"),
            is_error: true,
        });
        assert_eq!(
            compute_edit_augment(&c, &AugmentContext::default()),
            Augment::plain("String to replace not found", "tool reported an error")
        );
    }

    #[test]
    fn test_oversized_edit_degrades() {
        let mut ctx = AugmentContext::default();
        ctx.limits.diff_limit_bytes = 8;
        let augment = compute_edit_augment(
            &call(json!({"old_string": "aaaaaa", "new_string": "bbbbbb"})),
            &ctx,
        );
        assert!(augment.is_plain());
    }

    #[test]
    fn test_apply_edit() {
        assert_eq!(apply_edit("a a", "a", "b", false).as_deref(), Some("b a"));
        assert_eq!(apply_edit("a a", "a", "b", true).as_deref(), Some("b b"));
        assert_eq!(apply_edit("abc", "x", "y", false), None);
        assert_eq!(apply_edit("", "", "new", false).as_deref(), Some("new"));
    }
}
