//! Pipeline configuration.
//!
//! This is the configuration surface consumed by the streaming core. Everything
//! else (log levels, file locations) belongs to the binary's `AppConfig`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::augment::GeneratorKind;

/// Default highlighting theme, shipped with syntect.
pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Errors raised while validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("unknown highlight theme: {0}")]
    UnknownTheme(String),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Size limits and presentation settings for augment generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentLimits {
    /// Maximum bytes of written content to highlight.
    pub write_limit_bytes: usize,
    /// Maximum bytes of read content to highlight.
    pub read_limit_bytes: usize,
    /// Maximum combined bytes of before/after content to diff.
    pub diff_limit_bytes: usize,
    /// Syntect theme used for inline-styled markup.
    pub theme: String,
}

impl Default for AugmentLimits {
    fn default() -> Self {
        Self {
            write_limit_bytes: 64 * 1024,
            read_limit_bytes: 64 * 1024,
            diff_limit_bytes: 512 * 1024,
            theme: DEFAULT_THEME.to_string(),
        }
    }
}

/// Bounds of the per-session file snapshot cache used to diff edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Maximum number of files remembered per session.
    pub max_files: usize,
    /// Files larger than this are not remembered.
    pub max_file_bytes: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_files: 128,
            max_file_bytes: 1024 * 1024,
        }
    }
}

/// Configuration of one session pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub augment: AugmentLimits,
    /// Maximum augment computations in flight per session.
    pub max_in_flight: usize,
    /// Window within which text deltas for one block are merged.
    pub coalesce_window_ms: u64,
    /// Interval between heartbeat control events.
    pub heartbeat_interval_secs: u64,
    pub snapshots: SnapshotConfig,
    /// Tool name -> generator mapping. Replaces the defaults when set.
    pub tools: BTreeMap<String, GeneratorKind>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            augment: AugmentLimits::default(),
            max_in_flight: 4,
            coalesce_window_ms: 50,
            heartbeat_interval_secs: 15,
            snapshots: SnapshotConfig::default(),
            tools: default_tool_mappings(),
        }
    }
}

impl PipelineConfig {
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Check invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::invalid("max_in_flight", "must be at least 1"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "heartbeat_interval_secs",
                "must be at least 1",
            ));
        }
        if self.coalesce_window_ms >= self.heartbeat_interval_secs.saturating_mul(1000) {
            return Err(ConfigError::invalid(
                "coalesce_window_ms",
                "must be shorter than the heartbeat interval",
            ));
        }
        for (field, value) in [
            ("augment.write_limit_bytes", self.augment.write_limit_bytes),
            ("augment.read_limit_bytes", self.augment.read_limit_bytes),
            ("augment.diff_limit_bytes", self.augment.diff_limit_bytes),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than 0"));
            }
        }
        if !crate::augment::highlight::has_theme(&self.augment.theme) {
            return Err(ConfigError::UnknownTheme(self.augment.theme.clone()));
        }
        Ok(())
    }
}

/// Tool names recognized out of the box, across agent harnesses.
pub fn default_tool_mappings() -> BTreeMap<String, GeneratorKind> {
    let mut tools = BTreeMap::new();
    for name in ["Edit", "MultiEdit", "edit", "edit_file", "str_replace"] {
        tools.insert(name.to_string(), GeneratorKind::Edit);
    }
    for name in ["Write", "write", "create_file", "write_file"] {
        tools.insert(name.to_string(), GeneratorKind::Write);
    }
    for name in ["Read", "read", "read_file"] {
        tools.insert(name.to_string(), GeneratorKind::Read);
    }
    for name in ["ExitPlanMode", "exit_plan_mode"] {
        tools.insert(name.to_string(), GeneratorKind::PlanExit);
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coalesce_window(), Duration::from_millis(50));
        assert_eq!(config.tools.get("Edit"), Some(&GeneratorKind::Edit));
        assert_eq!(config.tools.get("ExitPlanMode"), Some(&GeneratorKind::PlanExit));
    }

    #[test]
    fn test_rejects_zero_in_flight() {
        let config = PipelineConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid value for max_in_flight: must be at least 1");
    }

    #[test]
    fn test_rejects_unknown_theme() {
        let mut config = PipelineConfig::default();
        config.augment.theme = "no-such-theme".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownTheme("no-such-theme".to_string()))
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
max_in_flight = 2

[augment]
read_limit_bytes = 1024

[tools]
view = "read"
"#,
        )
        .unwrap();

        assert_eq!(config.max_in_flight, 2);
        assert_eq!(config.augment.read_limit_bytes, 1024);
        assert_eq!(config.augment.write_limit_bytes, 64 * 1024);
        assert_eq!(config.tools.len(), 1);
        assert_eq!(config.tools.get("view"), Some(&GeneratorKind::Read));
    }
}
