// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::{Graph, ScheduledTask};
use crate::errors::Result;
use crate::exec::{Executor, ExecutorBackend, RealExecutorBackend};
use crate::report::RunReport;
use crate::types::TaskId;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent, RuntimeOptions};

/// Drives the DAG scheduler in response to `RuntimeEvent`s,
/// and delegates actual command execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels and dispatching tasks to the executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Starts the run and dispatches the root tasks.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them into the
    ///   core runtime.
    /// - Executes commands returned by the core (spawn, cancel, exit).
    ///
    /// Returns the finalized report once every task is terminal, or early if
    /// the event channel closes.
    pub async fn run(mut self) -> Result<RunReport> {
        info!("dagrun runtime started");

        let step = self.core.start();
        let mut keep_running = step.keep_running;
        for command in step.commands {
            self.execute_command(command).await?;
        }

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    warn!("runtime event channel closed before the run finished");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            keep_running = step.keep_running;
        }

        info!("runtime exiting");
        Ok(self.core.into_report())
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await?,
            CoreCommand::CancelTasks(tasks) => self.cancel_running(tasks).await?,
            CoreCommand::RequestExit => {
                // keep_running=false already ends the loop; just log it.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        debug!(?ids, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    async fn cancel_running(&mut self, tasks: Vec<TaskId>) -> Result<()> {
        debug!(ids = ?tasks, "cancelling running tasks");
        self.executor.cancel_tasks(tasks).await
    }
}

/// Run `graph` to completion with real processes.
pub async fn execute_graph(graph: &Graph, options: RuntimeOptions) -> Result<RunReport> {
    execute_graph_with_cancel(graph, options, CancellationToken::new()).await
}

/// Like [`execute_graph`]; cancelling `cancel` cancels the run.
pub async fn execute_graph_with_cancel(
    graph: &Graph,
    options: RuntimeOptions,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let executor = match options.working_dir {
        Some(dir) => Executor::with_working_dir(dir),
        None => Executor::new(),
    };
    let backend = RealExecutorBackend::new(rt_tx.clone(), executor);

    let cancel_forwarder = tokio::spawn(async move {
        cancel.cancelled().await;
        let _ = rt_tx.send(RuntimeEvent::CancelRequested).await;
    });

    let core = CoreRuntime::new(graph, options.max_concurrency);
    let result = Runtime::new(core, rt_rx, backend).run().await;

    cancel_forwarder.abort();
    result
}
