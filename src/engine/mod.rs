// src/engine/mod.rs

//! Orchestration engine for dagrun.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the run report (written only from here)
//! - the main runtime event loop that reacts to:
//!   - task completion events
//!   - cancellation requests (e.g. Ctrl-C)
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::path::PathBuf;

use crate::report::TaskResult;

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Upper bound on tasks running at the same time (clamped to >= 1).
    pub max_concurrency: usize,
    /// Default working directory for task processes.
    pub working_dir: Option<PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            working_dir: None,
        }
    }
}

/// Events flowing into the runtime from executors, signal handlers, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched task finished (successfully, failed, or cancelled).
    TaskCompleted { result: TaskResult },
    /// Stop the run: skip everything not yet started, kill what is running.
    CancelRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{Runtime, execute_graph, execute_graph_with_cancel};
