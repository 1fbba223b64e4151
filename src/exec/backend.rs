// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender,
//! so tests can swap in a fake executor while production uses
//! [`RealExecutorBackend`].
//!
//! - `RealExecutorBackend` wraps the [`spawn_executor`] loop and forwards
//!   scheduled tasks and cancellations over an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::{DagrunError, Result};
use crate::exec::executor::Executor;
use crate::types::TaskId;

use super::executor_loop::{ExecutorMessage, spawn_executor};

/// Trait abstracting how scheduled tasks are executed.
///
/// Every dispatched task must eventually produce exactly one
/// `RuntimeEvent::TaskCompleted`, including tasks that were cancelled.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask running tasks to stop. Tasks that already finished are ignored.
    fn cancel_tasks(
        &mut self,
        tasks: Vec<TaskId>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ExecutorMessage>,
}

impl RealExecutorBackend {
    /// Spawn the background executor loop and wire it to `runtime_tx`.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executor: Executor) -> Self {
        let tx = spawn_executor(runtime_tx, executor);
        Self { tx }
    }

    fn send_all(
        &self,
        messages: Vec<ExecutorMessage>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for msg in messages {
                tx.send(msg).await.map_err(|e| {
                    DagrunError::Other(anyhow::anyhow!("executor loop is gone: {e}"))
                })?;
            }
            Ok(())
        })
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.send_all(tasks.into_iter().map(ExecutorMessage::Run).collect())
    }

    fn cancel_tasks(
        &mut self,
        tasks: Vec<TaskId>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.send_all(tasks.into_iter().map(ExecutorMessage::Cancel).collect())
    }
}
