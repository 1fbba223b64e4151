#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use dagrun::config::{ConfigFile, ConfigSection, DefaultSection, RawConfigFile, TaskConfig};
use dagrun::dag::{Graph, TaskSpec};
use dagrun::types::TriggerRule;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                default: DefaultSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.config.config.max_concurrency = n;
        self
    }

    pub fn with_default_env(mut self, key: &str, value: &str) -> Self {
        self.config
            .default
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_default_trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.config.default.trigger_rule = Some(rule);
        self
    }

    pub fn with_default_max_attempts(mut self, n: u32) -> Self {
        self.config.default.max_attempts = Some(n);
        self
    }

    pub fn with_default_retry_delay(mut self, delay: &str) -> Self {
        self.config.default.retry_delay = Some(delay.to_string());
        self
    }

    /// The unvalidated config, for exercising validation errors.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(cmd.to_string()),
                args: None,
                after: vec![],
                env: BTreeMap::new(),
                trigger_rule: None,
                max_attempts: None,
                retry_delay: None,
                working_dir: None,
                best_effort: false,
            },
        }
    }

    /// Task running an argument vector instead of a shell string.
    pub fn with_args(args: &[&str]) -> Self {
        let mut builder = Self::new("");
        builder.task.cmd = None;
        builder.task.args = Some(args.iter().map(|s| s.to_string()).collect());
        builder
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.task.trigger_rule = Some(rule);
        self
    }

    pub fn all_done(self) -> Self {
        self.trigger_rule(TriggerRule::AllDone)
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.task.max_attempts = Some(n);
        self
    }

    pub fn retry_delay(mut self, delay: &str) -> Self {
        self.task.retry_delay = Some(delay.to_string());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.task.working_dir = Some(dir.into());
        self
    }

    pub fn best_effort(mut self, val: bool) -> Self {
        self.task.best_effort = val;
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for `Graph` that panics on invalid input.
///
/// Tasks default to a trivial shell command; only ids, edges and trigger
/// rules matter for scheduler tests.
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
        }
    }

    pub fn task(self, id: &str) -> Self {
        self.spec(TaskSpec::shell(id, "true"))
    }

    pub fn all_done_task(self, id: &str) -> Self {
        self.spec(TaskSpec::shell(id, "true").with_trigger_rule(TriggerRule::AllDone))
    }

    pub fn spec(mut self, spec: TaskSpec) -> Self {
        self.graph.add_task(spec).expect("add_task failed");
        self
    }

    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.graph
            .add_dependency(from, to)
            .expect("add_dependency failed");
        self
    }

    pub fn best_effort(mut self, id: &str) -> Self {
        self.graph
            .exclude_from_outcome(id)
            .expect("exclude_from_outcome failed");
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
