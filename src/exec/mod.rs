// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the commands defined in
//! the tasks, using `tokio::process::Command`, and reporting back to the
//! orchestration runtime via `RuntimeEvent`s.
//!
//! - [`executor`] runs a single task with retries and produces its
//!   `TaskResult`. It is usable on its own, without the runtime.
//! - [`executor_loop`] owns the background loop which manages task processes.
//! - [`task_runner`] bridges one executor run to a `TaskCompleted` event.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod executor;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor::{
    ATTEMPT_ENV, Executor, LAUNCH_FAILURE_EXIT_CODE, TASK_ID_ENV, TaskExecutionError,
};
pub use executor_loop::{ExecutorMessage, spawn_executor};
