//! Task-tracker sink with graceful degradation.
//!
//! Mirroring task state to an external tracker is strictly best-effort: the
//! orchestration result must be identical whether the tracker works or not.
//! Implementations report failures as errors; the [`TrackerHandle`] wrapper
//! the run driver uses logs them as warnings and swallows them.

use crate::core::task::{Task, TaskStatus};
use crate::error::{Error, Result};
use crate::flog_warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// External sink receiving task lifecycle updates.
pub trait TaskTracker: Send + Sync {
    /// Register a task before it first runs.
    fn create_task(&self, task: &Task) -> Result<()>;

    /// Report a status change for a previously created task.
    fn update_status(&self, task: &Task, status: &TaskStatus) -> Result<()>;
}

/// Tracker that records nothing. The default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracker;

impl TaskTracker for NoopTracker {
    fn create_task(&self, _task: &Task) -> Result<()> {
        Ok(())
    }

    fn update_status(&self, _task: &Task, _status: &TaskStatus) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrackedTask {
    name: String,
    status: TaskStatus,
}

/// Tracker that mirrors task state into a local JSON file.
///
/// The whole map is rewritten on every update; task counts are small and the
/// file doubles as a human-readable status snapshot.
#[derive(Debug)]
pub struct JsonFileTracker {
    path: PathBuf,
    tasks: Mutex<BTreeMap<String, TrackedTask>>,
}

impl JsonFileTracker {
    /// Create a tracker writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tasks: Mutex::new(BTreeMap::new()),
        }
    }

    /// The snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, tasks: &BTreeMap<String, TrackedTask>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(tasks)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl TaskTracker for JsonFileTracker {
    fn create_task(&self, task: &Task) -> Result<()> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| Error::Tracker("tracker state poisoned".to_string()))?;
        tasks.insert(
            task.id.to_string(),
            TrackedTask {
                name: task.name.clone(),
                status: task.status.clone(),
            },
        );
        self.flush(&tasks)
    }

    fn update_status(&self, task: &Task, status: &TaskStatus) -> Result<()> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| Error::Tracker("tracker state poisoned".to_string()))?;
        match tasks.get_mut(&task.id.to_string()) {
            Some(tracked) => tracked.status = status.clone(),
            None => {
                return Err(Error::Tracker(format!(
                    "update for unknown task {}",
                    task.name
                )))
            }
        }
        self.flush(&tasks)
    }
}

/// Infallible wrapper the run driver talks to.
///
/// Every tracker error becomes a warning in the foreman log and nothing
/// else; the run proceeds as if the call had succeeded.
pub struct TrackerHandle {
    inner: Box<dyn TaskTracker>,
}

impl TrackerHandle {
    pub fn new(tracker: Box<dyn TaskTracker>) -> Self {
        Self { inner: tracker }
    }

    /// A handle around the no-op tracker.
    pub fn noop() -> Self {
        Self::new(Box::new(NoopTracker))
    }

    pub fn create_task(&self, task: &Task) {
        if let Err(err) = self.inner.create_task(task) {
            flog_warn!("tracker create_task failed for {}: {}", task.name, err);
        }
    }

    pub fn update_status(&self, task: &Task, status: &TaskStatus) {
        if let Err(err) = self.inner.update_status(task, status) {
            flog_warn!("tracker update_status failed for {}: {}", task.name, err);
        }
    }
}

impl std::fmt::Debug for TrackerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerHandle").finish_non_exhaustive()
    }
}
