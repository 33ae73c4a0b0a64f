//! Parallel execution of one level.
//!
//! The `ParallelExecutor` launches one [`ProcessSupervisor`] per task in an
//! execution level and joins on all of them: a fork/join barrier, not a race
//! for the first completion. Every launched task writes its outcome into its
//! own slot of the result map the moment that task finishes, so no result
//! can be lost regardless of completion order.

use crate::core::graph::{DependencyGraph, ExecutionLevel};
use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use crate::exec::supervisor::{Outcome, ProcessSupervisor};
use crate::flog_debug;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Executes the tasks of one level concurrently.
///
/// Concurrency is optionally bounded by a semaphore; unbounded means one
/// in-flight worker per task in the level. Sibling tasks are never cancelled
/// when one fails: they share no dependency edge and their results remain
/// useful for the audit trail.
pub struct ParallelExecutor {
    /// Supervisor template cloned per task.
    supervisor: ProcessSupervisor,
    /// Optional cap on concurrently running workers.
    max_concurrency: Option<usize>,
}

impl ParallelExecutor {
    /// Create an executor with unbounded per-level concurrency.
    pub fn new(supervisor: ProcessSupervisor) -> Self {
        Self {
            supervisor,
            max_concurrency: None,
        }
    }

    /// Cap the number of workers running at once.
    ///
    /// A limit of zero is treated as one: a zero-permit semaphore would
    /// deadlock the level barrier.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    /// The configured concurrency cap, if any.
    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency
    }

    /// Run every task of `level` concurrently and barrier on completion.
    ///
    /// Returns exactly one outcome per task in the level. Task statuses in
    /// the graph are updated on both sides of the barrier: Running before,
    /// terminal after.
    ///
    /// # Errors
    /// Only bookkeeping failures (a level member missing from the graph, log
    /// IO) propagate; worker failures are data, captured in outcomes.
    pub async fn run_level(
        &self,
        graph: &mut DependencyGraph,
        level: &ExecutionLevel,
    ) -> Result<HashMap<TaskId, Outcome>> {
        // Snapshot the tasks before the barrier; statuses flow back after.
        let mut tasks: Vec<Task> = Vec::with_capacity(level.tasks.len());
        for id in &level.tasks {
            let task = graph.get_task_mut(id).ok_or(Error::TaskNotFound(*id))?;
            task.start();
            tasks.push(task.clone());
        }

        flog_debug!(
            "level {}: launching {} task(s), concurrency={:?}",
            level.index,
            tasks.len(),
            self.max_concurrency
        );

        let semaphore = self
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit)));

        // One future per task, each owning its (TaskId, Outcome) slot. The
        // join_all barrier returns every slot, which is what makes losing a
        // sibling's result impossible by construction.
        let futures = tasks.iter().map(|task| {
            let supervisor = self.supervisor.clone();
            let semaphore = semaphore.clone();
            async move {
                let _permit = match &semaphore {
                    Some(sem) => Some(sem.acquire().await.map_err(|e| {
                        Error::TaskJoin(format!("semaphore closed: {}", e))
                    })?),
                    None => None,
                };
                let outcome = supervisor.run(task).await?;
                Ok::<(TaskId, Outcome), Error>((task.id, outcome))
            }
        });

        let mut outcomes = HashMap::with_capacity(tasks.len());
        for result in join_all(futures).await {
            let (id, outcome) = result?;
            if let Some(task) = graph.get_task_mut(&id) {
                task.finish(outcome.classification);
            }
            outcomes.insert(id, outcome);
        }

        flog_debug!(
            "level {}: barrier complete, {} outcome(s)",
            level.index,
            outcomes.len()
        );

        Ok(outcomes)
    }
}

/// Whether a completed level blocks progression to the next.
///
/// A level fails as a whole if any member's outcome is not Success.
pub fn level_failed(outcomes: &HashMap<TaskId, Outcome>) -> bool {
    outcomes.values().any(|o| !o.is_success())
}
