//! Augment generators.
//!
//! A generator turns one completed tool invocation into a rendering augment.
//! Generators are pure: no I/O, no shared state. Everything they need beyond
//! the tool call travels in [`AugmentContext`]. They never fail; on bad input
//! they return a degraded `Augment::Plain` and log a warning.

mod edit;
pub mod highlight;
pub mod language;
mod plan;
mod read;
mod write;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strand_protocol::{Augment, ToolCall};

use crate::config::AugmentLimits;

pub use edit::{apply_edit, compute_edit_augment};
pub use plan::{compute_plan_augment, summarize_plan};
pub use read::{compute_read_augment, strip_line_numbers, tool_result_text};
pub use write::compute_write_augment;

/// Inputs to augment generation besides the tool call itself.
#[derive(Debug, Clone, Default)]
pub struct AugmentContext {
    /// Last known content of the file the tool touched, if any.
    pub prior_content: Option<String>,
    pub limits: AugmentLimits,
}

/// Effect of a completed tool call on the per-session file snapshot cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotUpdate {
    Record { path: String, content: String },
    /// The cached content can no longer be trusted.
    Forget { path: String },
}

/// Computes a rendering augment for one completed tool invocation.
pub trait AugmentGenerator: Send + Sync {
    fn generate(&self, call: &ToolCall, ctx: &AugmentContext) -> Augment;

    /// How this call changes the snapshot cache. `prior` is the cached content
    /// of the target file before the call.
    fn snapshot(&self, _call: &ToolCall, _prior: Option<&str>) -> Option<SnapshotUpdate> {
        None
    }
}

/// Built-in generator kinds, addressable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    Edit,
    Write,
    Read,
    PlanExit,
}

impl GeneratorKind {
    pub fn generator(self) -> Arc<dyn AugmentGenerator> {
        match self {
            Self::Edit => Arc::new(EditGenerator),
            Self::Write => Arc::new(WriteGenerator),
            Self::Read => Arc::new(ReadGenerator),
            Self::PlanExit => Arc::new(PlanGenerator),
        }
    }
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Edit => write!(f, "edit"),
            Self::Write => write!(f, "write"),
            Self::Read => write!(f, "read"),
            Self::PlanExit => write!(f, "plan_exit"),
        }
    }
}

pub struct EditGenerator;

impl AugmentGenerator for EditGenerator {
    fn generate(&self, call: &ToolCall, ctx: &AugmentContext) -> Augment {
        compute_edit_augment(call, ctx)
    }

    fn snapshot(&self, call: &ToolCall, prior: Option<&str>) -> Option<SnapshotUpdate> {
        let path = file_path(call)?.to_string();
        match edit::edited_content(call, prior) {
            Some(content) => Some(SnapshotUpdate::Record { path, content }),
            None if prior.is_some() => Some(SnapshotUpdate::Forget { path }),
            None => None,
        }
    }
}

pub struct WriteGenerator;

impl AugmentGenerator for WriteGenerator {
    fn generate(&self, call: &ToolCall, ctx: &AugmentContext) -> Augment {
        compute_write_augment(call, ctx)
    }

    fn snapshot(&self, call: &ToolCall, _prior: Option<&str>) -> Option<SnapshotUpdate> {
        Some(SnapshotUpdate::Record {
            path: file_path(call)?.to_string(),
            content: write::written_content(call)?.to_string(),
        })
    }
}

pub struct ReadGenerator;

impl AugmentGenerator for ReadGenerator {
    fn generate(&self, call: &ToolCall, ctx: &AugmentContext) -> Augment {
        compute_read_augment(call, ctx)
    }

    fn snapshot(&self, call: &ToolCall, _prior: Option<&str>) -> Option<SnapshotUpdate> {
        // Partial reads do not describe the whole file.
        if ["offset", "limit"]
            .iter()
            .any(|key| call.input.get(key).is_some_and(|v| !v.is_null()))
        {
            return None;
        }
        let path = file_path(call)?;
        let result = call.result.as_ref()?;
        let text = tool_result_text(&result.content)?;
        Some(SnapshotUpdate::Record {
            path: path.to_string(),
            content: strip_line_numbers(&text),
        })
    }
}

pub struct PlanGenerator;

impl AugmentGenerator for PlanGenerator {
    fn generate(&self, call: &ToolCall, _ctx: &AugmentContext) -> Augment {
        compute_plan_augment(call)
    }
}

/// Tool name -> generator lookup.
#[derive(Clone, Default)]
pub struct DispatchTable {
    generators: HashMap<String, Arc<dyn AugmentGenerator>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(tools: &BTreeMap<String, GeneratorKind>) -> Self {
        let mut table = Self::new();
        for (name, kind) in tools {
            table.register(name.clone(), kind.generator());
        }
        table
    }

    /// Register (or replace) the generator for a tool name.
    pub fn register(&mut self, name: impl Into<String>, generator: Arc<dyn AugmentGenerator>) {
        self.generators.insert(name.into(), generator);
    }

    pub fn get(&self, tool_name: &str) -> Option<Arc<dyn AugmentGenerator>> {
        self.generators.get(tool_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.generators.keys().collect();
        names.sort();
        f.debug_struct("DispatchTable").field("tools", &names).finish()
    }
}

/// Path of the file a tool call targets.
pub fn file_path(call: &ToolCall) -> Option<&str> {
    call.input_str_any(&["file_path", "path", "filePath", "notebook_path"])
}

/// Plain augment for a tool that reported an error.
fn failed_tool(call: &ToolCall) -> Option<Augment> {
    let result = call.result.as_ref().filter(|r| r.is_error)?;
    let content = tool_result_text(&result.content).unwrap_or_default();
    Some(Augment::plain(content, "tool reported an error"))
}

/// String input under any of `keys`. Non-string values count as missing.
fn string_input<'a>(input: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| input.get(*key).and_then(Value::as_str))
}
