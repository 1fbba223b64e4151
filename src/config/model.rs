// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::task::{RetryPolicy, TaskCommand, TaskSpec};
use crate::errors::{DagrunError, Result};
use crate::types::TriggerRule;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// max_concurrency = 2
///
/// [default]
/// env = { DBT_PROJECT_DIR = "/opt/dbt_project" }
/// retry_delay = "5m"
///
/// [task.dbt_seed]
/// cmd = "cd $DBT_PROJECT_DIR && dbt seed"
///
/// [task.edr_report]
/// cmd = "cd $DBT_PROJECT_DIR && edr report"
/// after = ["dbt_seed"]
/// trigger_rule = "all_done"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global run settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Defaults applied to every task from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    /// All tasks from `[task.<id>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated configuration. Construct via `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        default: DefaultSection,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            config,
            default,
            task,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Upper bound on tasks running at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Default working directory for every task.
    ///
    /// Relative paths are resolved against the config file's directory by
    /// the loader.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            working_dir: None,
        }
    }
}

/// `[default]` section, applied to tasks that do not override a setting.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Environment shared by all tasks; task `env` entries win on collision.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Duration string such as `"30s"` or `"5m"`.
    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(default)]
    pub trigger_rule: Option<TriggerRule>,
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Shell command; exclusive with `args`.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Argument vector executed without a shell; exclusive with `cmd`.
    #[serde(default)]
    pub args: Option<Vec<String>>,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Falls back to `default.trigger_rule`, then `all_success`.
    #[serde(default)]
    pub trigger_rule: Option<TriggerRule>,

    /// Falls back to `default.max_attempts`, then 1.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Falls back to `default.retry_delay`, then no delay.
    #[serde(default)]
    pub retry_delay: Option<String>,

    /// Relative paths resolve against `[config].working_dir`.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Exclude this task from the overall run status.
    #[serde(default)]
    pub best_effort: bool,
}

impl TaskConfig {
    pub fn effective_trigger_rule(&self, defaults: &DefaultSection) -> TriggerRule {
        self.trigger_rule
            .or(defaults.trigger_rule)
            .unwrap_or_default()
    }

    pub fn effective_max_attempts(&self, defaults: &DefaultSection) -> u32 {
        self.max_attempts.or(defaults.max_attempts).unwrap_or(1)
    }

    pub fn effective_retry_delay(
        &self,
        defaults: &DefaultSection,
    ) -> std::result::Result<Duration, String> {
        match self.retry_delay.as_deref().or(defaults.retry_delay.as_deref()) {
            Some(s) => parse_duration(s),
            None => Ok(Duration::ZERO),
        }
    }

    /// The command described by `cmd` / `args`.
    pub fn command(&self) -> std::result::Result<TaskCommand, String> {
        match (&self.cmd, &self.args) {
            (Some(cmd), None) if !cmd.trim().is_empty() => Ok(TaskCommand::Shell(cmd.clone())),
            (None, Some(args)) if !args.is_empty() => Ok(TaskCommand::Exec(args.clone())),
            (Some(_), Some(_)) => Err("`cmd` and `args` are mutually exclusive".to_string()),
            _ => Err("one of `cmd` or a non-empty `args` is required".to_string()),
        }
    }

    /// Build the [`TaskSpec`] for task `id`, applying `[default]`.
    pub fn to_spec(&self, id: &str, defaults: &DefaultSection) -> Result<TaskSpec> {
        let command = self
            .command()
            .map_err(|e| DagrunError::ConfigError(format!("task '{id}': {e}")))?;

        let delay = self
            .effective_retry_delay(defaults)
            .map_err(|e| DagrunError::ConfigError(format!("task '{id}': {e}")))?;
        let retry = RetryPolicy::new(self.effective_max_attempts(defaults), delay);

        let mut spec = TaskSpec::new(id, command)
            .with_envs(defaults.env.clone())
            .with_envs(self.env.clone())
            .with_trigger_rule(self.effective_trigger_rule(defaults))
            .with_retry(retry);

        if let Some(dir) = &self.working_dir {
            spec = spec.with_working_dir(dir.clone());
        }

        Ok(spec)
    }
}

/// Parse durations like `"500ms"`, `"30s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
