//! Dependency graph for task planning.
//!
//! This module provides the DependencyGraph structure that represents task
//! dependencies as a directed acyclic graph and computes execution levels:
//! maximal sets of mutually-independent tasks that are safe to run
//! concurrently.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::path::PathBuf;

/// One position in the topological leveling of the graph.
///
/// A level contains exactly the tasks whose longest dependency chain has
/// length equal to the level index, so every dependency of a member sits in
/// a strictly earlier level and members are free of edges between each other.
#[derive(Debug, Clone)]
pub struct ExecutionLevel {
    /// Zero-based position in the execution order.
    pub index: usize,
    /// Tasks scheduled at this level.
    pub tasks: Vec<TaskId>,
}

impl ExecutionLevel {
    /// Number of tasks in this level.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the level holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// The task dependency graph.
///
/// DependencyGraph uses petgraph's DiGraph to represent dependencies. Nodes
/// are tasks; an edge from A to B means B depends on A. Cycles are rejected
/// at edge-insertion time so the graph is acyclic by construction.
pub struct DependencyGraph {
    /// The underlying directed graph.
    graph: DiGraph<Task, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Add a task to the graph.
    ///
    /// Returns the NodeIndex for the added task. If the task already exists
    /// (same TaskId), returns the existing NodeIndex.
    pub fn add_task(&mut self, task: Task) -> NodeIndex {
        if let Some(&index) = self.task_index.get(&task.id) {
            return index;
        }

        let id = task.id;
        let index = self.graph.add_node(task);
        self.task_index.insert(id, index);
        index
    }

    /// Add a dependency edge: `from` must succeed before `to` can start.
    ///
    /// The edge is validated against cycle creation; on violation the edge is
    /// removed again and the graph is unchanged.
    ///
    /// # Errors
    /// Returns an error if either task is not in the graph or if the edge
    /// would create a cycle.
    pub fn add_dependency(&mut self, from: &TaskId, to: &TaskId) -> Result<()> {
        let from_index = *self
            .task_index
            .get(from)
            .ok_or(Error::TaskNotFound(*from))?;
        let to_index = *self.task_index.get(to).ok_or(Error::TaskNotFound(*to))?;

        // Temporarily add the edge to check for cycles
        let edge = self.graph.add_edge(from_index, to_index, ());

        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            let name = |idx: NodeIndex| {
                self.graph
                    .node_weight(idx)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| "unknown".to_string())
            };
            return Err(Error::Cycle {
                from: name(from_index),
                to: name(to_index),
            });
        }

        // Mirror the edge into the task's own dependency set so tasks stay
        // self-describing for audit output.
        if let Some(task) = self.graph.node_weight_mut(to_index) {
            task.dependencies.insert(*from);
        }

        Ok(())
    }

    /// Get a reference to a task by its ID.
    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Get a mutable reference to a task by its ID.
    pub fn get_task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        if let Some(&index) = self.task_index.get(id) {
            self.graph.node_weight_mut(index)
        } else {
            None
        }
    }

    /// Get the number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if a dependency edge exists between two tasks.
    pub fn has_dependency(&self, from: &TaskId, to: &TaskId) -> bool {
        if let (Some(&from_idx), Some(&to_idx)) =
            (self.task_index.get(from), self.task_index.get(to))
        {
            self.graph.find_edge(from_idx, to_idx).is_some()
        } else {
            false
        }
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if the graph contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    /// All tasks in the graph.
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.graph.node_weights().collect()
    }

    /// Compute the execution levels by longest-path leveling.
    ///
    /// Each task is placed at level = length of its longest dependency chain,
    /// i.e. the earliest level at which all of its dependencies are
    /// satisfied. This yields maximal parallelism per level: the number of
    /// levels equals the longest chain in the graph.
    ///
    /// Within a level the tasks are sorted by name so the ordering is stable
    /// for reports and tests.
    ///
    /// # Errors
    /// Returns `TouchConflict` if two tasks in the same level declare
    /// overlapping `touches` sets. Concurrent writers to the same path are a
    /// planning error, never a runtime race.
    pub fn levels(&self) -> Result<Vec<ExecutionLevel>> {
        if self.graph.node_count() == 0 {
            return Ok(Vec::new());
        }

        // add_dependency keeps the graph acyclic, so toposort cannot fail
        // unless the graph was mutated through a bug.
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let name = self
                .graph
                .node_weight(cycle.node_id())
                .map(|t| t.name.clone())
                .unwrap_or_else(|| "unknown".to_string());
            Error::Cycle {
                from: name.clone(),
                to: name,
            }
        })?;

        // Longest dependency chain per node, walked in topological order.
        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        let mut max_depth = 0usize;
        for index in sorted {
            let d = self
                .graph
                .neighbors_directed(index, petgraph::Direction::Incoming)
                .map(|dep| depth.get(&dep).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            max_depth = max_depth.max(d);
            depth.insert(index, d);
        }

        let mut levels: Vec<ExecutionLevel> = (0..=max_depth)
            .map(|index| ExecutionLevel {
                index,
                tasks: Vec::new(),
            })
            .collect();

        let mut members: Vec<(usize, &Task)> = depth
            .iter()
            .filter_map(|(&index, &d)| self.graph.node_weight(index).map(|t| (d, t)))
            .collect();
        members.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));

        for (d, task) in &members {
            levels[*d].tasks.push(task.id);
        }

        self.check_touch_conflicts(&levels)?;

        Ok(levels)
    }

    /// Reject any level in which two tasks declare the same touched path.
    fn check_touch_conflicts(&self, levels: &[ExecutionLevel]) -> Result<()> {
        for level in levels {
            let mut touched: HashMap<&PathBuf, &str> = HashMap::new();
            for id in &level.tasks {
                let task = self.get_task(id).ok_or(Error::TaskNotFound(*id))?;
                for path in &task.touches {
                    if let Some(other) = touched.insert(path, task.name.as_str()) {
                        return Err(Error::TouchConflict {
                            a: other.to_string(),
                            b: task.name.clone(),
                            level: level.index,
                            path: path.display().to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
