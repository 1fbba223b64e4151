// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, info, warn};

use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::types::{TaskId, TriggerRule};

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    /// Task ids in topological order.
    order: &'a [TaskId],
    tasks: &'a mut HashMap<TaskId, TaskInfo>,
    ready: &'a mut VecDeque<TaskId>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        order: &'a [TaskId],
        tasks: &'a mut HashMap<TaskId, TaskInfo>,
        ready: &'a mut VecDeque<TaskId>,
    ) -> Self {
        Self {
            order,
            tasks,
            ready,
        }
    }

    /// Put every task into `Pending` for a fresh run.
    pub fn mark_all_pending(&mut self) {
        self.ready.clear();
        for info in self.tasks.values_mut() {
            info.run_state = Some(RunState::Pending);
        }
    }

    /// Evaluate every `Pending` task whose upstreams are all terminal.
    ///
    /// Tasks whose trigger rule holds become `Ready` and join the ready queue;
    /// the others become `Skipped`. Walking in topological order lets a skip
    /// cascade through a whole chain in one pass.
    ///
    /// Returns the tasks newly marked as skipped.
    pub fn promote_pending(&mut self) -> Vec<TaskId> {
        let mut skipped = Vec::new();

        for id in self.order {
            let decision = match self.tasks.get(id) {
                Some(info) if info.run_state == Some(RunState::Pending) => {
                    ReadOnlyStateManager::new(self.tasks).trigger_decision(info)
                }
                _ => continue,
            };

            let Some(runs) = decision else {
                continue;
            };

            if let Some(info) = self.tasks.get_mut(id) {
                if runs {
                    debug!(
                        task = %info.id,
                        trigger_rule = %info.spec.trigger_rule,
                        "trigger rule satisfied; marking Ready"
                    );
                    info.run_state = Some(RunState::Ready);
                    self.ready.push_back(id.clone());
                } else {
                    info!(
                        task = %info.id,
                        trigger_rule = %info.spec.trigger_rule,
                        "upstream did not succeed; skipping task"
                    );
                    info.run_state = Some(RunState::Skipped);
                    skipped.push(id.clone());
                }
            }
        }

        skipped
    }

    /// Move `Ready` tasks to `Running` while fewer than `limit` tasks run.
    pub fn dispatch_ready(&mut self, limit: usize) -> Vec<ScheduledTask> {
        let mut running = self.count_in(RunState::Running);
        let mut scheduled = Vec::new();

        while running < limit {
            let Some(id) = self.ready.pop_front() else {
                break;
            };

            let Some(info) = self.tasks.get_mut(&id) else {
                warn!(task = %id, "ready task missing from tasks map");
                continue;
            };

            if info.run_state != Some(RunState::Ready) {
                continue;
            }

            info!(task = %info.id, "dispatching task");
            info.run_state = Some(RunState::Running);
            scheduled.push(ScheduledTask::from_task_info(info));
            running += 1;
        }

        scheduled
    }

    /// Cancellation: every `Pending` / `Ready` task becomes `Skipped`.
    ///
    /// Returns the newly skipped tasks in topological order.
    pub fn skip_non_started(&mut self) -> Vec<TaskId> {
        self.ready.clear();

        let mut skipped = Vec::new();
        for id in self.order {
            if let Some(info) = self.tasks.get_mut(id) {
                if matches!(
                    info.run_state,
                    Some(RunState::Pending) | Some(RunState::Ready)
                ) {
                    debug!(task = %info.id, "run cancelled; marking Skipped");
                    info.run_state = Some(RunState::Skipped);
                    skipped.push(id.clone());
                }
            }
        }

        skipped
    }

    /// Tasks currently `Running`, in topological order.
    pub fn running_tasks(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| {
                self.tasks
                    .get(*id)
                    .is_some_and(|info| info.run_state == Some(RunState::Running))
            })
            .cloned()
            .collect()
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        ReadOnlyStateManager::new(self.tasks).all_tasks_terminal()
    }

    fn count_in(&self, state: RunState) -> usize {
        self.tasks
            .values()
            .filter(|info| info.run_state == Some(state))
            .count()
    }
}

/// A read-only view for evaluating upstream state.
///
/// Used when only shared access to the tasks map is available (e.g. in
/// `Scheduler::deps_terminal`).
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a HashMap<TaskId, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a HashMap<TaskId, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// Terminal states of all direct upstreams, or `None` while any of them
    /// is still pending, ready or running.
    pub fn upstream_terminal_states(&self, info: &TaskInfo) -> Option<Vec<RunState>> {
        let mut states = Vec::with_capacity(info.deps.len());

        for dep_id in &info.deps {
            let Some(dep) = self.tasks.get(dep_id) else {
                warn!(
                    task = %info.id,
                    dep = %dep_id,
                    "dependency missing from tasks map"
                );
                return None;
            };

            match dep.run_state {
                Some(state) if state.is_terminal() => states.push(state),
                _ => return None,
            }
        }

        Some(states)
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks
            .values()
            .all(|info| info.run_state.is_some_and(RunState::is_terminal))
    }

    /// Decide what happens to a pending task.
    ///
    /// - `None`: some upstream is not terminal yet; decide later.
    /// - `Some(true)`: the trigger rule holds; the task should run.
    /// - `Some(false)`: the trigger rule can never hold; skip the task.
    pub fn trigger_decision(&self, info: &TaskInfo) -> Option<bool> {
        let upstream = self.upstream_terminal_states(info)?;

        let runs = match info.spec.trigger_rule {
            TriggerRule::AllSuccess => upstream.iter().all(|s| *s == RunState::Success),
            TriggerRule::AllDone => true,
        };

        Some(runs)
    }
}
