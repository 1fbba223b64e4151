// src/dag/task.rs

//! Immutable description of one unit of work.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::types::{TaskId, TriggerRule};

/// How a task's process is invoked.
///
/// The core never interprets the command; it only decides how to hand it to
/// the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCommand {
    /// Run through the platform shell (`sh -c` / `cmd /C`).
    Shell(String),
    /// Execute `argv[0]` directly with the remaining arguments.
    Exec(Vec<String>),
}

impl fmt::Display for TaskCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskCommand::Shell(cmd) => f.write_str(cmd),
            TaskCommand::Exec(argv) => write!(f, "{}", argv.join(" ")),
        }
    }
}

/// Retry behaviour for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Always >= 1.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Build a policy; `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Description of a task as it lives in a [`Graph`](crate::dag::Graph).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub command: TaskCommand,
    /// Variables merged over the inherited process environment.
    pub env: BTreeMap<String, String>,
    pub trigger_rule: TriggerRule,
    pub retry: RetryPolicy,
    /// Directory the command runs in; `None` uses the executor default.
    pub working_dir: Option<PathBuf>,
}

impl TaskSpec {
    /// A task running `cmd` through the platform shell.
    pub fn shell(id: impl Into<TaskId>, cmd: impl Into<String>) -> Self {
        Self::new(id, TaskCommand::Shell(cmd.into()))
    }

    /// A task executing an argument vector directly.
    pub fn exec<I, S>(id: impl Into<TaskId>, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(id, TaskCommand::Exec(argv.into_iter().map(Into::into).collect()))
    }

    pub fn new(id: impl Into<TaskId>, command: TaskCommand) -> Self {
        Self {
            id: id.into(),
            command,
            env: BTreeMap::new(),
            trigger_rule: TriggerRule::default(),
            retry: RetryPolicy::default(),
            working_dir: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.trigger_rule = rule;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}
