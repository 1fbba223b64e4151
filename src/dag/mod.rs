// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`task`] describes one unit of work ([`TaskSpec`]).
//! - [`graph`] holds the validated directed acyclic graph of tasks.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready, which are skipped, and when the run is over.
//! - [`task_info`] provides per-run task state and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task;
pub mod task_info;

pub use graph::{Graph, TopologicalOrder};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task::{RetryPolicy, TaskCommand, TaskSpec};
pub use task_info::{ScheduledTask, TaskRunState};
