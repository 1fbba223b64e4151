// src/exec/task_runner.rs

//! Runs one scheduled task and reports the result to the runtime.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::executor::Executor;

/// Execute `task` via `executor` and send exactly one
/// `RuntimeEvent::TaskCompleted` back, cancelled or not.
///
/// The runtime relies on that single completion event to move the task out
/// of `Running`, so it is sent even when `cancel` fired.
pub async fn run_task(
    executor: Executor,
    task: ScheduledTask,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel: CancellationToken,
) {
    let result = executor.run_cancellable(&task.spec, cancel).await;

    debug!(
        task = %task.id,
        status = %result.status,
        attempts = result.attempts,
        cancelled = result.cancelled,
        "task runner finished"
    );

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted { result })
        .await
        .is_err()
    {
        error!(
            task = %task.id,
            "runtime channel closed; dropping task completion"
        );
    }
}
