use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;

use dagrun::dag::ScheduledTask;
use dagrun::engine::RuntimeEvent;
use dagrun::errors::{DagrunError, Result};
use dagrun::exec::ExecutorBackend;
use dagrun::report::TaskResult;
use dagrun::types::{TaskId, TaskStatus};

/// Build a result as a real executor would for a single attempt.
pub fn fake_result(id: &str, status: TaskStatus, cancelled: bool) -> TaskResult {
    let now = Utc::now();
    TaskResult {
        task_id: id.to_string(),
        status,
        attempts: 1,
        exit_code: match (status, cancelled) {
            (_, true) => None,
            (TaskStatus::Success, _) => Some(0),
            _ => Some(1),
        },
        started_at: now,
        finished_at: now,
        error: (status != TaskStatus::Success).then(|| "fake failure".to_string()),
        cancelled,
        stdout: String::new(),
        stderr: String::new(),
    }
}

/// A fake executor that:
/// - records which tasks were "run" and which were cancelled
/// - immediately reports `TaskCompleted` for each scheduled task, with the
///   scripted status (default `Success`)
/// - keeps "held" tasks running until they are cancelled
///
/// Completions are sent on the runtime's own channel from inside the
/// runtime loop, so keep graphs smaller than the channel capacity.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    cancelled: Arc<Mutex<Vec<String>>>,
    outcomes: HashMap<TaskId, TaskStatus>,
    held: HashSet<TaskId>,
    running_held: HashSet<TaskId>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            cancelled: Arc::new(Mutex::new(Vec::new())),
            outcomes: HashMap::new(),
            held: HashSet::new(),
            running_held: HashSet::new(),
        }
    }

    /// Report `status` whenever `task` runs.
    pub fn with_outcome(mut self, task: &str, status: TaskStatus) -> Self {
        self.outcomes.insert(task.to_string(), status);
        self
    }

    /// Never complete `task` on its own; it finishes only when cancelled.
    pub fn hold(mut self, task: &str) -> Self {
        self.held.insert(task.to_string());
        self
    }

    /// Shared log of cancel requests, in arrival order.
    pub fn cancelled_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.cancelled)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);

        let mut completions = Vec::new();
        for t in &tasks {
            if self.held.contains(&t.id) {
                self.running_held.insert(t.id.clone());
            } else {
                let status = self
                    .outcomes
                    .get(&t.id)
                    .copied()
                    .unwrap_or(TaskStatus::Success);
                completions.push(fake_result(&t.id, status, false));
            }
        }

        Box::pin(async move {
            {
                let mut guard = executed.lock().unwrap();
                guard.extend(tasks.iter().map(|t| t.id.clone()));
            }

            for result in completions {
                tx.send(RuntimeEvent::TaskCompleted { result })
                    .await
                    .map_err(|e| DagrunError::Other(anyhow::anyhow!("{e}")))?;
            }
            Ok(())
        })
    }

    fn cancel_tasks(
        &mut self,
        tasks: Vec<TaskId>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let cancelled = Arc::clone(&self.cancelled);

        let completions: Vec<TaskResult> = tasks
            .iter()
            .filter(|id| self.running_held.remove(*id))
            .map(|id| fake_result(id, TaskStatus::Failed, true))
            .collect();

        Box::pin(async move {
            {
                let mut guard = cancelled.lock().unwrap();
                guard.extend(tasks);
            }

            for result in completions {
                tx.send(RuntimeEvent::TaskCompleted { result })
                    .await
                    .map_err(|e| DagrunError::Other(anyhow::anyhow!("{e}")))?;
            }
            Ok(())
        })
    }
}
