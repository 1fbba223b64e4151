// src/report.rs

//! Per-task results and the aggregated report for one run.
//!
//! A [`RunReport`] is created empty when a run starts, filled in by the
//! engine (the single writer) as tasks finish or are skipped, and finalized
//! when the run ends. After that it is read-only.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dag::Graph;
use crate::errors::{DagrunError, Result};
use crate::types::{RunStatus, TaskId, TaskStatus};

/// Outcome of one task in one run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Attempts actually made (0 for skipped tasks).
    pub attempts: u32,
    /// Exit code of the final attempt. `-1` means the process could not be
    /// launched; `None` means it never ran or was killed by a signal.
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Why the final attempt failed, if it did.
    pub error: Option<String>,
    /// The task was terminated by a cancellation request.
    pub cancelled: bool,
    /// Captured output of the final attempt.
    pub stdout: String,
    pub stderr: String,
}

impl TaskResult {
    /// Result for a task that was never executed.
    pub fn skipped(task_id: impl Into<TaskId>) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Skipped,
            attempts: 0,
            exit_code: None,
            started_at: now,
            finished_at: now,
            error: None,
            cancelled: false,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn duration(&self) -> std::time::Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

/// Tally of task statuses in a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Tasks of the graph with no recorded result.
    pub missing: usize,
}

/// Aggregated results for one execution of a [`Graph`].
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Task ids in topological order.
    order: Vec<TaskId>,
    /// Tasks excluded from the overall status.
    best_effort: BTreeSet<TaskId>,
    results: HashMap<TaskId, TaskResult>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    /// Create an empty report for a run of `graph`.
    pub fn new(graph: &Graph) -> Self {
        let order: Vec<TaskId> = graph.topological_order().map(str::to_string).collect();
        let best_effort = order
            .iter()
            .filter(|id| !graph.counts_toward_outcome(id))
            .cloned()
            .collect();

        Self {
            order,
            best_effort,
            results: HashMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Insert or replace the result for `result.task_id`.
    pub fn record(&mut self, result: TaskResult) -> Result<()> {
        if !self.order.iter().any(|id| *id == result.task_id) {
            return Err(DagrunError::UnknownTask(result.task_id));
        }
        if self.is_finalized() {
            return Err(DagrunError::ReportFinalized(result.task_id));
        }

        self.results.insert(result.task_id.clone(), result);
        Ok(())
    }

    /// Freeze the report. Later calls are no-ops.
    pub fn finalize(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Overall status: `Success` iff every counted task ended `Success`.
    ///
    /// Counted tasks without a recorded result count as not successful.
    pub fn summary(&self) -> RunStatus {
        let all_counted_succeeded = self
            .order
            .iter()
            .filter(|id| !self.best_effort.contains(*id))
            .all(|id| self.results.get(id).is_some_and(TaskResult::is_success));

        if all_counted_succeeded {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }

    pub fn result(&self, task: &str) -> Option<&TaskResult> {
        self.results.get(task)
    }

    /// Recorded results in topological order.
    pub fn results(&self) -> impl Iterator<Item = &TaskResult> {
        self.order.iter().filter_map(|id| self.results.get(id))
    }

    pub fn counts_toward_outcome(&self, task: &str) -> bool {
        self.order.iter().any(|id| id == task) && !self.best_effort.contains(task)
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for id in &self.order {
            match self.results.get(id).map(|r| r.status) {
                Some(TaskStatus::Success) => counts.success += 1,
                Some(TaskStatus::Failed) => counts.failed += 1,
                Some(TaskStatus::Skipped) => counts.skipped += 1,
                None => counts.missing += 1,
            }
        }
        counts
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Serialize the report for downstream consumers.
    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct ReportJson<'a> {
            status: RunStatus,
            started_at: DateTime<Utc>,
            finished_at: Option<DateTime<Utc>>,
            counts: StatusCounts,
            best_effort: &'a BTreeSet<TaskId>,
            tasks: Vec<&'a TaskResult>,
        }

        let json = ReportJson {
            status: self.summary(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            counts: self.counts(),
            best_effort: &self.best_effort,
            tasks: self.results().collect(),
        };

        Ok(serde_json::to_string_pretty(&json)?)
    }

    /// Plain-text table for terminal output.
    pub fn render(&self) -> String {
        let width = self
            .order
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(4)
            .max(4);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<width$}  {:<8}  {:>8}  {:>5}  {:>9}",
            "TASK", "STATUS", "ATTEMPTS", "EXIT", "DURATION"
        );

        for id in &self.order {
            let (status, attempts, exit, duration) = match self.results.get(id) {
                Some(r) => (
                    r.status.to_string(),
                    r.attempts.to_string(),
                    r.exit_code.map_or_else(|| "-".to_string(), |c| c.to_string()),
                    format!("{:.1}s", r.duration().as_secs_f64()),
                ),
                None => ("-".to_string(), "-".to_string(), "-".to_string(), "-".to_string()),
            };

            let mut note = String::new();
            if self.best_effort.contains(id) {
                note.push_str("  (best effort)");
            }
            if self.results.get(id).is_some_and(|r| r.cancelled) {
                note.push_str("  (cancelled)");
            }

            let _ = writeln!(
                out,
                "{:<width$}  {:<8}  {:>8}  {:>5}  {:>9}{}",
                id, status, attempts, exit, duration, note
            );
        }

        let counts = self.counts();
        let _ = writeln!(
            out,
            "\nrun status: {} ({} succeeded, {} failed, {} skipped)",
            self.summary(),
            counts.success,
            counts.failed,
            counts.skipped
        );

        out
    }
}
