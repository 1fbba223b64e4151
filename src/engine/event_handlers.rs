// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, warn};

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep, TaskRunState};
use crate::report::{RunReport, TaskResult};
use crate::types::TaskId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Ask the executor to stop these running tasks.
    CancelTasks(Vec<TaskId>),
    /// Every task is terminal; the run is over.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn idle() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: true,
        }
    }
}

/// Handle a task completion event.
///
/// The result is recorded before the scheduler advances so downstream skips
/// land in the report after their cause.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    report: &mut RunReport,
    result: TaskResult,
) -> CoreStep {
    let id = result.task_id.clone();
    let status = result.status;

    if scheduler.run_state_of(&id) != Some(TaskRunState::Running) {
        warn!(
            task = %id,
            %status,
            "completion event for task that is not running; ignoring"
        );
        return CoreStep::idle();
    }

    if let Err(err) = report.record(result) {
        warn!(task = %id, error = %err, "failed to record task result");
    }

    let step = scheduler.step_completion(&id, status);
    apply_scheduler_step(report, step)
}

/// Handle a cancellation request.
pub fn handle_cancel_request(scheduler: &mut Scheduler, report: &mut RunReport) -> CoreStep {
    if scheduler.is_cancelled() {
        debug!("run already cancelled; ignoring repeated request");
        return CoreStep::idle();
    }

    let step = scheduler.step_cancel();
    apply_scheduler_step(report, step)
}

/// Turn a scheduler step into report updates and shell commands.
pub fn apply_scheduler_step(report: &mut RunReport, step: SchedulerStep) -> CoreStep {
    for id in step.newly_skipped {
        if let Err(err) = report.record(TaskResult::skipped(id.as_str())) {
            warn!(task = %id, error = %err, "failed to record skipped task");
        }
    }

    let mut commands = Vec::new();

    if !step.to_cancel.is_empty() {
        commands.push(CoreCommand::CancelTasks(step.to_cancel));
    }

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    let mut keep_running = true;
    if step.run_just_finished {
        keep_running = false;
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
