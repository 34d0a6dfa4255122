//! Rendering augments attached to completed tool blocks.

use serde::{Deserialize, Serialize};

/// Structured summary of a plan-mode exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlanSummary {
    /// First heading or first non-empty line of the plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Top-level list items, in order.
    #[serde(default)]
    pub steps: Vec<String>,
    /// Rendered plan markup.
    #[serde(default)]
    pub html: String,
}

/// A computed rendering enrichment.
///
/// Augments are immutable: each is computed once, on final content, and
/// attached to exactly one completed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Augment {
    /// Unified diff of a file edit.
    Edit {
        #[serde(rename = "unifiedDiff")]
        unified_diff: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(rename = "filePath", default, skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
    },

    /// Highlighted content of a file write.
    Write {
        #[serde(rename = "highlightedHtml")]
        highlighted_html: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        truncated: bool,
        #[serde(rename = "filePath", default, skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
    },

    /// Highlighted content returned by a file read.
    Read {
        #[serde(rename = "highlightedHtml")]
        highlighted_html: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        truncated: bool,
        #[serde(rename = "filePath", default, skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
    },

    /// Summary of a plan-mode exit.
    Plan { summary: PlanSummary },

    /// Degraded augment: plain content when enrichment was not possible.
    Plain {
        content: String,
        /// Short human-readable explanation of why enrichment failed.
        note: String,
    },
}

impl Augment {
    pub fn plain(content: impl Into<String>, note: impl Into<String>) -> Self {
        Self::Plain {
            content: content.into(),
            note: note.into(),
        }
    }

    /// True for the degraded plain-content form.
    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Plain { .. })
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Edit { .. } => "edit",
            Self::Write { .. } => "write",
            Self::Read { .. } => "read",
            Self::Plan { .. } => "plan",
            Self::Plain { .. } => "plain",
        }
    }
}
