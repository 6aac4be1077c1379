//! JSON run file describing one resource to converge.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use vprov_engine::{
    Attributes, DesiredLifecycle, DesiredStateSpec, DiffPolicy, ReconcileConfig, TargetIdentity,
    TransitionTable, WaitConfig,
};

/// How an existing resource with drifted attributes is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Send every drifted attribute.
    #[default]
    Replace,
    /// Only add missing members of unordered list attributes.
    Additive,
    /// Create and delete only; drift is reported as an error.
    None,
}

impl UpdateMode {
    pub fn table(self) -> TransitionTable {
        match self {
            UpdateMode::Replace => TransitionTable::standard(),
            UpdateMode::Additive => TransitionTable::additive(),
            UpdateMode::None => TransitionTable::create_only(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitSection {
    pub max_attempts: Option<u32>,
    pub delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    pub target: TargetIdentity,
    #[serde(default)]
    pub state: DesiredLifecycle,
    #[serde(default)]
    pub attributes: Attributes,
    /// REST collection holding the resource, e.g. `portgroups`.
    pub collection: String,
    #[serde(default)]
    pub unordered_attributes: Vec<String>,
    #[serde(default)]
    pub update_mode: UpdateMode,
    #[serde(default)]
    pub readiness_url: Option<String>,
    #[serde(default)]
    pub wait: WaitSection,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Wait and timeout overrides given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitOverrides {
    pub max_attempts: Option<u32>,
    pub delay_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid run file {}", path.display()))
    }

    pub fn spec(&self) -> DesiredStateSpec {
        DesiredStateSpec {
            target: self.target.clone(),
            lifecycle: self.state,
            attributes: self.attributes.clone(),
        }
    }

    /// Engine configuration. Flags win over the file, the file over defaults.
    pub fn reconcile_config(&self, flags: WaitOverrides) -> Result<ReconcileConfig> {
        let file = WaitOverrides {
            max_attempts: self.wait.max_attempts,
            delay_seconds: self.wait.delay_seconds,
            timeout_seconds: None,
        };
        let config = ReconcileConfig {
            wait: wait_config(flags, file),
            operation_timeout: flags.timeout_seconds.map(Duration::from_secs),
            diff: DiffPolicy::unordered(self.unordered_attributes.iter().cloned()),
        };
        config.validate().context("invalid wait settings")?;
        Ok(config)
    }
}

/// Merge wait settings: `flags` first, then `file`, then the defaults.
pub fn wait_config(flags: WaitOverrides, file: WaitOverrides) -> WaitConfig {
    let defaults = WaitConfig::default();
    WaitConfig {
        max_attempts: flags
            .max_attempts
            .or(file.max_attempts)
            .unwrap_or(defaults.max_attempts),
        delay: flags
            .delay_seconds
            .or(file.delay_seconds)
            .map(Duration::from_secs)
            .unwrap_or(defaults.delay),
    }
}
