//! Plan-exit augments: a structured summary of the proposed plan.

use comrak::{Options, markdown_to_html};
use once_cell::sync::Lazy;
use regex::Regex;
use strand_protocol::{Augment, PlanSummary, ToolCall};

use super::{failed_tool, string_input};

/// Top-level list item: bullet or ordered marker, optional task checkbox.
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[-*+]|\d{1,9}[.)])\s+(?:\[[ xX]\]\s+)?(.+)$").expect("valid regex")
});

/// Render plan markdown. Raw HTML in the plan is omitted.
fn render_markdown(content: &str) -> String {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    markdown_to_html(content, &options)
}

/// Summarize plan markdown into title, steps and rendered markup.
pub fn summarize_plan(plan: &str) -> PlanSummary {
    let mut heading = None;
    let mut first_line = None;
    let mut steps = Vec::new();
    let mut in_fence = false;

    for line in plan.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || trimmed.is_empty() {
            continue;
        }
        if heading.is_none() && trimmed.starts_with('#') {
            let text = trimmed.trim_start_matches('#').trim();
            if !text.is_empty() {
                heading = Some(text.to_string());
            }
        }
        if first_line.is_none() {
            first_line = Some(trimmed.to_string());
        }
        // Indented items are sub-steps.
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        if let Some(caps) = LIST_ITEM.captures(line) {
            steps.push(caps[1].trim().to_string());
        }
    }

    PlanSummary {
        title: heading.or(first_line),
        steps,
        html: render_markdown(plan),
    }
}

pub fn compute_plan_augment(call: &ToolCall) -> Augment {
    if let Some(plain) = failed_tool(call) {
        return plain;
    }
    match string_input(&call.input, &["plan"]) {
        Some(plan) if !plan.trim().is_empty() => Augment::Plan {
            summary: summarize_plan(plan),
        },
        _ => {
            tracing::warn!(tool = %call.name, tool_use_id = %call.id, "plan exit without plan text");
            Augment::plain(call.input.to_string(), "missing plan")
        }
    }
}
