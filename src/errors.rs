// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum DagrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Duplicate task: {0}")]
    DuplicateTask(TaskId),

    #[error("Task not found: {0}")]
    UnknownTask(TaskId),

    #[error("Cycle detected in DAG: edge '{from}' -> '{to}' would close a cycle")]
    Cycle { from: TaskId, to: TaskId },

    #[error("Run report is finalized; cannot record result for task '{0}'")]
    ReportFinalized(TaskId),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagrunError>;
