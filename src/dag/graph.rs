// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::config::model::{ConfigFile, DefaultSection, TaskConfig};
use crate::dag::task::TaskSpec;
use crate::errors::{DagrunError, Result};
use crate::types::{TaskId, TriggerRule};

/// Directed acyclic graph of tasks keyed by task id.
///
/// Edge direction is `upstream -> downstream`: an edge `A -> B` means
/// "B depends on A". Node indices follow insertion order (nodes are never
/// removed), which gives topological ordering a stable tie-break.
///
/// Acyclicity is checked on every [`Graph::add_dependency`] call, so a
/// `Graph` value is always a valid DAG.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    graph: DiGraph<TaskSpec, ()>,
    index: HashMap<TaskId, NodeIndex>,
    /// Tasks excluded from the overall run status.
    best_effort: HashSet<TaskId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::from_task_configs(&cfg.default, &cfg.task)
    }

    /// Build a graph from `[task.*]` sections plus `[default]`.
    ///
    /// Tasks are inserted in the map's (lexical) order; every
    /// `after = [...]` entry becomes an edge `dep -> task`.
    pub fn from_task_configs(
        defaults: &DefaultSection,
        tasks: &BTreeMap<String, TaskConfig>,
    ) -> Result<Self> {
        let mut graph = Graph::new();

        for (name, tc) in tasks.iter() {
            graph.add_task(tc.to_spec(name, defaults)?)?;
        }

        for (name, tc) in tasks.iter() {
            for dep in tc.after.iter() {
                graph.add_dependency(dep, name)?;
            }
            if tc.best_effort {
                graph.exclude_from_outcome(name)?;
            }
        }

        Ok(graph)
    }

    /// Add a task. Fails if a task with the same id already exists.
    pub fn add_task(&mut self, spec: TaskSpec) -> Result<()> {
        if self.index.contains_key(&spec.id) {
            return Err(DagrunError::DuplicateTask(spec.id));
        }

        let id = spec.id.clone();
        let node = self.graph.add_node(spec);
        self.index.insert(id, node);
        Ok(())
    }

    /// Record that `to` depends on `from`.
    ///
    /// Fails with `UnknownTask` if either end is missing and with `Cycle` if
    /// `from` is already reachable from `to`. On failure the graph is left
    /// untouched. Adding an edge that already exists is a no-op.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<()> {
        let from_idx = self.node(from)?;
        let to_idx = self.node(to)?;

        if from_idx == to_idx || has_path_connecting(&self.graph, to_idx, from_idx, None) {
            return Err(DagrunError::Cycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if self.graph.contains_edge(from_idx, to_idx) {
            debug!(from, to, "dependency already present; ignoring");
            return Ok(());
        }

        self.graph.add_edge(from_idx, to_idx, ());
        Ok(())
    }

    /// Exclude a task from the overall run status (a best-effort step).
    pub fn exclude_from_outcome(&mut self, id: &str) -> Result<()> {
        self.node(id)?;
        self.best_effort.insert(id.to_string());
        Ok(())
    }

    /// Whether the task's result counts toward the overall run status.
    pub fn counts_toward_outcome(&self, id: &str) -> bool {
        self.index.contains_key(id) && !self.best_effort.contains(id)
    }

    /// Lazily yield task ids so that each task comes after all its upstreams.
    ///
    /// Among tasks whose upstreams are all emitted, the one inserted first
    /// comes first. Each call starts a fresh traversal.
    pub fn topological_order(&self) -> TopologicalOrder<'_> {
        TopologicalOrder::new(&self.graph)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskSpec> {
        self.graph.node_weights()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Direct upstreams of a task, in insertion order.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct downstreams of a task, in insertion order.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Tasks that run regardless of upstream outcome.
    pub fn always_run_tasks(&self) -> impl Iterator<Item = &str> {
        self.tasks()
            .filter(|t| t.trigger_rule == TriggerRule::AllDone)
            .map(|t| t.id.as_str())
    }

    fn node(&self, id: &str) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| DagrunError::UnknownTask(id.to_string()))
    }

    fn neighbors(&self, id: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };

        let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(idx, dir).collect();
        nodes.sort_unstable();
        nodes
            .into_iter()
            .map(|n| self.graph[n].id.as_str())
            .collect()
    }
}

/// Kahn's algorithm, one task per `next()`.
pub struct TopologicalOrder<'a> {
    graph: &'a DiGraph<TaskSpec, ()>,
    in_degree: Vec<usize>,
    ready: BinaryHeap<Reverse<usize>>,
}

impl<'a> TopologicalOrder<'a> {
    fn new(graph: &'a DiGraph<TaskSpec, ()>) -> Self {
        let in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let ready = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        Self {
            graph,
            in_degree,
            ready,
        }
    }
}

impl<'a> Iterator for TopologicalOrder<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let graph = self.graph;
        let Reverse(i) = self.ready.pop()?;
        let node = NodeIndex::new(i);

        for succ in graph.neighbors_directed(node, Direction::Outgoing) {
            let degree = &mut self.in_degree[succ.index()];
            *degree -= 1;
            if *degree == 0 {
                self.ready.push(Reverse(succ.index()));
            }
        }

        Some(graph[node].id.as_str())
    }
}
