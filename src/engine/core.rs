// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state (scheduler + run report)
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s and cancellations to the executor
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use crate::dag::{Graph, Scheduler};
use crate::engine::RuntimeEvent;
use crate::engine::event_handlers::{
    CoreStep, apply_scheduler_step, handle_cancel_request, handle_task_completion,
};
use crate::report::RunReport;

/// Pure core runtime state.
///
/// This owns the DAG scheduler and the run report, and is the only writer
/// of the report. It has **no** channels, no Tokio types, and does not
/// perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    report: RunReport,
}

impl CoreRuntime {
    pub fn new(graph: &Graph, max_concurrency: usize) -> Self {
        Self {
            scheduler: Scheduler::new(graph, max_concurrency),
            report: RunReport::new(graph),
        }
    }

    /// Start the run and return the initial dispatches.
    ///
    /// An empty graph finishes immediately.
    pub fn start(&mut self) -> CoreStep {
        let step = self.scheduler.start_run();
        apply_scheduler_step(&mut self.report, step)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted { result } => {
                handle_task_completion(&mut self.scheduler, &mut self.report, result)
            }
            RuntimeEvent::CancelRequested => {
                handle_cancel_request(&mut self.scheduler, &mut self.report)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Finalize and hand out the report.
    pub fn into_report(mut self) -> RunReport {
        self.report.finalize();
        self.report
    }
}
