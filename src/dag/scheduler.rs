// src/dag/scheduler.rs

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info, warn};

use crate::dag::graph::Graph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::{RunState, TaskInfo, TaskRunState};
use crate::types::{TaskId, TaskStatus};

/// Scheduler holds a snapshot of the DAG plus mutable per-run state.
///
/// It is responsible for:
/// - deciding when a task's upstreams are terminal and its trigger rule holds
/// - skipping tasks whose trigger rule can no longer hold
/// - bounding how many tasks run at once
/// - cancelling the run on request
///
/// It performs no IO; the engine feeds it completion events.
#[derive(Debug)]
pub struct Scheduler {
    /// Task ids in topological order.
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, TaskInfo>,
    /// `Ready` tasks waiting for a concurrency slot, FIFO.
    ready: VecDeque<TaskId>,
    max_concurrency: usize,
    started: bool,
    cancelled: bool,
}

impl Scheduler {
    /// Snapshot `graph` into a scheduler.
    ///
    /// `max_concurrency` is clamped to at least 1.
    pub fn new(graph: &Graph, max_concurrency: usize) -> Self {
        let order: Vec<TaskId> = graph.topological_order().map(str::to_string).collect();

        let tasks = graph
            .tasks()
            .map(|spec| {
                let deps = graph
                    .dependencies_of(&spec.id)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                (spec.id.clone(), TaskInfo::new(spec.clone(), deps))
            })
            .collect();

        Self {
            order,
            tasks,
            ready: VecDeque::new(),
            max_concurrency: max_concurrency.max(1),
            started: false,
            cancelled: false,
        }
    }

    /// Whether every task has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.started && ReadOnlyStateManager::new(&self.tasks).all_tasks_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Read-only view of the given task's run state.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        let info = self.tasks.get(task)?;
        Some(info.run_state.into())
    }

    /// Whether every direct upstream of `task` is terminal.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_terminal(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        let mgr = ReadOnlyStateManager::new(&self.tasks);
        Some(mgr.upstream_terminal_states(info).is_some())
    }

    /// Task ids in the order the scheduler evaluates them.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of tasks currently dispatched.
    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|info| info.run_state == Some(RunState::Running))
            .count()
    }

    /// Start the run: every task becomes `Pending`, roots become `Ready`, and
    /// as many ready tasks as the concurrency limit allows are dispatched.
    pub fn start_run(&mut self) -> SchedulerStep {
        if self.started {
            warn!("start_run called on a scheduler that already started; ignoring");
            return SchedulerStep::default();
        }

        self.started = true;
        debug!(
            tasks = self.order.len(),
            max_concurrency = self.max_concurrency,
            "scheduler: starting DAG run"
        );

        let mut manager = StateManager::new(&self.order, &mut self.tasks, &mut self.ready);
        manager.mark_all_pending();

        self.advance()
    }

    /// Record a running task's terminal status and promote its downstreams.
    pub fn step_completion(&mut self, task: &str, status: TaskStatus) -> SchedulerStep {
        match self.tasks.get_mut(task) {
            Some(info) if info.run_state == Some(RunState::Running) => {
                info.run_state = Some(status.into());
                match status {
                    TaskStatus::Success => {
                        debug!(task = %info.id, "task completed successfully");
                    }
                    TaskStatus::Failed | TaskStatus::Skipped => {
                        warn!(task = %info.id, %status, "task did not succeed");
                    }
                }
            }
            Some(info) => {
                warn!(
                    task = %task,
                    state = ?info.run_state,
                    "completion for task that is not running; ignoring"
                );
                return SchedulerStep::default();
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
                return SchedulerStep::default();
            }
        }

        self.advance()
    }

    /// Cancel the run.
    ///
    /// Pending and ready tasks become `Skipped` (all tasks, if the run never
    /// started) and nothing new is dispatched afterwards. Running tasks are
    /// listed in `to_cancel`; their completions are still accepted.
    pub fn step_cancel(&mut self) -> SchedulerStep {
        if self.cancelled {
            return SchedulerStep::default();
        }

        self.cancelled = true;
        let was_finished = self.is_finished();

        let mut manager = StateManager::new(&self.order, &mut self.tasks, &mut self.ready);
        if !self.started {
            self.started = true;
            manager.mark_all_pending();
        }
        let newly_skipped = manager.skip_non_started();
        let to_cancel = manager.running_tasks();
        let all_terminal = manager.all_tasks_terminal();

        info!(
            skipped = newly_skipped.len(),
            running = to_cancel.len(),
            "scheduler: run cancelled"
        );

        SchedulerStep {
            newly_scheduled: Vec::new(),
            newly_skipped,
            to_cancel,
            run_just_finished: !was_finished && all_terminal,
        }
    }

    /// Promote pending tasks, dispatch ready ones, and report whether the run
    /// just finished.
    fn advance(&mut self) -> SchedulerStep {
        let mut manager = StateManager::new(&self.order, &mut self.tasks, &mut self.ready);

        let newly_skipped = manager.promote_pending();
        let newly_scheduled = if self.cancelled {
            Vec::new()
        } else {
            manager.dispatch_ready(self.max_concurrency)
        };
        let run_just_finished = manager.all_tasks_terminal();

        if run_just_finished {
            info!("scheduler: all tasks terminal; run finished");
        }

        SchedulerStep {
            newly_scheduled,
            newly_skipped,
            to_cancel: Vec::new(),
            run_just_finished,
        }
    }
}
