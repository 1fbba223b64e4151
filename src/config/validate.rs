// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::Graph;
use crate::errors::{DagrunError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DagrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.default, raw.task))
    }
}

/// Run every semantic check on a deserialized config.
pub fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_settings(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DagrunError::ConfigError(
            "config must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_concurrency == 0 {
        return Err(DagrunError::ConfigError(
            "[config].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.default.max_attempts == Some(0) {
        return Err(DagrunError::ConfigError(
            "[default].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_task_settings(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        task.command()
            .map_err(|e| DagrunError::ConfigError(format!("task '{name}': {e}")))?;

        if task.max_attempts == Some(0) {
            return Err(DagrunError::ConfigError(format!(
                "task '{}': max_attempts must be >= 1 (got 0)",
                name
            )));
        }

        task.effective_retry_delay(&cfg.default)
            .map_err(|e| DagrunError::ConfigError(format!("task '{name}': {e}")))?;
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(DagrunError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(DagrunError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

/// Building the graph rejects cycles edge by edge.
fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    Graph::from_task_configs(&cfg.default, &cfg.task).map(|_| ())
}
