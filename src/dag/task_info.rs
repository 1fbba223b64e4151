// src/dag/task_info.rs

//! Task metadata and per-run state.

use std::sync::Arc;

use crate::dag::task::TaskSpec;
use crate::types::{TaskId, TaskStatus};

/// Per-run state of a task (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting for upstream tasks to become terminal.
    Pending,
    /// Trigger rule satisfied; waiting for a free concurrency slot.
    Ready,
    /// Dispatched to the executor.
    Running,
    Success,
    Failed,
    /// Never executed: trigger rule unsatisfied or run cancelled.
    Skipped,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Success | RunState::Failed | RunState::Skipped)
    }
}

impl From<TaskStatus> for RunState {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Success => RunState::Success,
            TaskStatus::Failed => RunState::Failed,
            TaskStatus::Skipped => RunState::Skipped,
        }
    }
}

/// Public, read-only view of a task's per-run state.
///
/// Exposed for tests and diagnostics without leaking the internal
/// `RunState` type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// The run has not been started yet.
    NotStarted,
    Pending,
    Ready,
    Running,
    Success,
    Failed,
    Skipped,
}

impl From<Option<RunState>> for TaskRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => TaskRunState::NotStarted,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Ready) => TaskRunState::Ready,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::Success) => TaskRunState::Success,
            Some(RunState::Failed) => TaskRunState::Failed,
            Some(RunState::Skipped) => TaskRunState::Skipped,
        }
    }
}

/// Static task information taken from the graph, plus per-run state.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub spec: Arc<TaskSpec>,
    /// Direct upstream dependencies.
    pub deps: Vec<TaskId>,
    /// Per-run state (`None` until the run starts).
    pub run_state: Option<RunState>,
}

impl TaskInfo {
    pub fn new(spec: TaskSpec, deps: Vec<TaskId>) -> Self {
        Self {
            id: spec.id.clone(),
            spec: Arc::new(spec),
            deps,
            run_state: None,
        }
    }
}

/// Description of a task that the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub spec: Arc<TaskSpec>,
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo) -> Self {
        Self {
            id: info.id.clone(),
            spec: Arc::clone(&info.spec),
        }
    }
}
