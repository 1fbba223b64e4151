use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// Predicate over the terminal states of a task's direct upstreams.
///
/// - `AllSuccess`: run only if every direct upstream succeeded; otherwise the
///   task is skipped without being executed (default).
/// - `AllDone`: run once every direct upstream is terminal, whatever the
///   outcome. Reporting steps that must always run use this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRule {
    AllSuccess,
    AllDone,
}

impl Default for TriggerRule {
    fn default() -> Self {
        TriggerRule::AllSuccess
    }
}

impl FromStr for TriggerRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all_success" => Ok(TriggerRule::AllSuccess),
            "all_done" => Ok(TriggerRule::AllDone),
            other => Err(format!(
                "invalid trigger_rule: {other} (expected \"all_success\" or \"all_done\")"
            )),
        }
    }
}

impl fmt::Display for TriggerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerRule::AllSuccess => f.write_str("all_success"),
            TriggerRule::AllDone => f.write_str("all_done"),
        }
    }
}

/// Final status of a single task in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Success => f.write_str("SUCCESS"),
            TaskStatus::Failed => f.write_str("FAILED"),
            TaskStatus::Skipped => f.write_str("SKIPPED"),
        }
    }
}

/// Overall status of a run, derived from the counted task results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn is_success(self) -> bool {
        self == RunStatus::Success
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => f.write_str("SUCCESS"),
            RunStatus::Failed => f.write_str("FAILED"),
        }
    }
}
