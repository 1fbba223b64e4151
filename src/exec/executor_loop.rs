// src/exec/executor_loop.rs

//! Main executor loop that manages running task processes.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::executor::Executor;
use crate::exec::task_runner::run_task;
use crate::types::TaskId;

/// Requests accepted by the executor loop.
#[derive(Debug)]
pub enum ExecutorMessage {
    /// Start the task in its own Tokio task.
    Run(ScheduledTask),
    /// Kill the task's process (or abort its retry delay) if it is running.
    Cancel(TaskId),
}

/// Internal handle for a currently-running task.
///
/// - `cancel` interrupts the process or the retry delay.
/// - `handle` is the Tokio task driving the executor.
struct ActiveTask {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned sender is what `RealExecutorBackend` forwards to. A task id
/// never has more than one process in flight: the scheduler dispatches each
/// task once per run, and a duplicate request is ignored here.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executor: Executor,
) -> mpsc::Sender<ExecutorMessage> {
    let (tx, mut rx) = mpsc::channel::<ExecutorMessage>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<TaskId, ActiveTask> = HashMap::new();

        while let Some(msg) = rx.recv().await {
            active.retain(|_, t| !t.handle.is_finished());

            match msg {
                ExecutorMessage::Run(task) => {
                    handle_scheduled_task(task, &mut active, &executor, &runtime_tx);
                }
                ExecutorMessage::Cancel(id) => cancel_active_task(&id, &active),
            }
        }

        // Channel closed: the runtime is gone, stop whatever is left.
        for (id, task) in active {
            debug!(task = %id, "executor shutting down; cancelling task");
            task.cancel.cancel();
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn handle_scheduled_task(
    task: ScheduledTask,
    active: &mut HashMap<TaskId, ActiveTask>,
    executor: &Executor,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let id = task.id.clone();

    if active.contains_key(&id) {
        warn!(task = %id, "task already running; ignoring duplicate dispatch");
        return;
    }

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_task(
        executor.clone(),
        task,
        runtime_tx.clone(),
        cancel.clone(),
    ));

    active.insert(id, ActiveTask { cancel, handle });
}

fn cancel_active_task(id: &str, active: &HashMap<TaskId, ActiveTask>) {
    match active.get(id) {
        Some(task) => {
            info!(task = %id, "cancelling running task");
            task.cancel.cancel();
        }
        None => {
            debug!(task = %id, "cancel requested but task is not running");
        }
    }
}
