//! Plan-file parsing.
//!
//! A plan is a TOML file declaring tasks (with name-based dependencies),
//! validation stages, and an optional assembly section for the quality gate.
//! Parsing is purely structural; cycle and conflict detection happen when the
//! plan is lowered into a [`DependencyGraph`].

use crate::core::graph::DependencyGraph;
use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use crate::exec::worker::WorkerSpec;
use crate::validate::ValidationLevel;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A worker declaration: either a bare shell string or a full spec table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WorkerDecl {
    Shell(String),
    Spec(WorkerSpec),
}

impl WorkerDecl {
    fn into_spec(self) -> WorkerSpec {
        match self {
            WorkerDecl::Shell(script) => WorkerSpec::shell(&script),
            WorkerDecl::Spec(spec) => spec,
        }
    }
}

/// One `[[task]]` table.
#[derive(Debug, Clone, Deserialize)]
struct TaskDecl {
    name: String,
    worker: WorkerDecl,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    touches: Vec<PathBuf>,
    timeout_secs: Option<u64>,
    grace_secs: Option<u64>,
}

/// One `[[validation]]` table: a named stage of shell commands.
#[derive(Debug, Clone, Deserialize)]
struct ValidationDecl {
    name: String,
    commands: Vec<String>,
}

/// The `[assembly]` table: the worker whose artifact the gate scores.
///
/// Regeneration re-invokes this worker in full; the artifact file is re-read
/// after each invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct AssemblySpec {
    worker: WorkerDecl,
    /// Artifact file, relative to the workspace.
    pub artifact: PathBuf,
}

impl AssemblySpec {
    /// The worker invoked to (re)produce the artifact.
    pub fn worker(&self) -> WorkerSpec {
        self.worker.clone().into_spec()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PlanFile {
    name: Option<String>,
    #[serde(default, rename = "task")]
    tasks: Vec<TaskDecl>,
    #[serde(default, rename = "validation")]
    validations: Vec<ValidationDecl>,
    assembly: Option<AssemblySpec>,
}

/// A parsed, structurally valid plan.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Display name; defaults to the file stem.
    pub name: String,
    tasks: Vec<TaskDecl>,
    validations: Vec<ValidationDecl>,
    /// Gate input, when the plan declares one.
    pub assembly: Option<AssemblySpec>,
}

impl Plan {
    /// Load and parse a plan file.
    ///
    /// # Errors
    /// IO and TOML errors propagate; a plan with no tasks is rejected.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file: PlanFile = toml::from_str(&content)?;

        if file.tasks.is_empty() {
            return Err(Error::Plan(format!(
                "plan {} declares no tasks",
                path.display()
            )));
        }

        let name = file.name.unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "plan".to_string())
        });

        Ok(Self {
            name,
            tasks: file.tasks,
            validations: file.validations,
            assembly: file.assembly,
        })
    }

    /// Number of declared tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Lower the plan into a dependency graph.
    ///
    /// Tasks are inserted first, then name-based `depends_on` edges are
    /// resolved and added with cycle checking.
    ///
    /// # Errors
    /// Duplicate task names and unknown dependency names are plan errors;
    /// cycle errors come from the graph.
    pub fn build_graph(&self) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        let mut by_name: HashMap<&str, TaskId> = HashMap::new();

        for decl in &self.tasks {
            if by_name.contains_key(decl.name.as_str()) {
                return Err(Error::Plan(format!("duplicate task name: {}", decl.name)));
            }
            let mut task = Task::new(&decl.name, decl.worker.clone().into_spec());
            if let Some(secs) = decl.timeout_secs {
                task = task.with_timeout(Duration::from_secs(secs));
            }
            if let Some(secs) = decl.grace_secs {
                task = task.with_grace_period(Duration::from_secs(secs));
            }
            for path in &decl.touches {
                task = task.with_touch(path.clone());
            }
            by_name.insert(decl.name.as_str(), task.id);
            graph.add_task(task);
        }

        for decl in &self.tasks {
            let to = by_name[decl.name.as_str()];
            for dep_name in &decl.depends_on {
                let from = *by_name
                    .get(dep_name.as_str())
                    .ok_or_else(|| Error::UnknownTaskName(dep_name.clone()))?;
                graph.add_dependency(&from, &to)?;
            }
        }

        Ok(graph)
    }

    /// The declared validation stages, in order.
    pub fn validation_levels(&self) -> Vec<ValidationLevel> {
        self.validations
            .iter()
            .map(|decl| ValidationLevel::new(&decl.name, &decl.commands))
            .collect()
    }
}
