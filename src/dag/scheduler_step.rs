// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::types::TaskId;

/// Structured result of a single scheduler "step".
///
/// Useful for tests that want to manually step the DAG and make assertions
/// about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks dispatched to the executor as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that were newly marked as skipped in this step.
    pub newly_skipped: Vec<TaskId>,
    /// Running tasks the executor should terminate (cancellation only).
    pub to_cancel: Vec<TaskId>,
    /// Whether this step made every task terminal.
    pub run_just_finished: bool,
}
