//! Task data model for the execution graph.
//!
//! Tasks are the atomic units of work delegated to external workers. Each
//! task tracks its dependencies, the workspace paths it will write, its
//! timeout budget, and the classified outcome of its worker process.

use crate::exec::worker::WorkerSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Default soft timeout for a worker process (10 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_SECS: u64 = 5;

/// Unique identifier for a task within a run.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task status in its lifecycle.
///
/// A task transitions to Ready only when every dependency has Succeeded,
/// and once terminal it is retained for audit, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Task created but dependencies not yet satisfied.
    Pending,
    /// All dependencies succeeded, task can be scheduled.
    Ready,
    /// Worker process is executing.
    Running,
    /// Worker exited with success classification.
    Succeeded,
    /// Worker failed, timed out, or was killed.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// Operator chose to skip past a failed level containing this task.
    Skipped,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Classified result of a supervised worker process.
///
/// The numeric codes mirror the shell convention consumed by callers:
/// 0 success, 124 timeout, 125 spawn failure, 137 force-killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitClassification {
    /// Process exited zero before the timeout.
    Success,
    /// Process exited non-zero before the timeout.
    GenericFailure,
    /// Process exceeded its timeout but honored SIGTERM within the grace period.
    Timeout,
    /// Process ignored SIGTERM and required SIGKILL.
    ForceKilled,
    /// The supervisor could not spawn the process at all.
    SpawnFailure,
}

impl ExitClassification {
    /// Classify a raw exit code from a process that exited before timeout.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => ExitClassification::Success,
            _ => ExitClassification::GenericFailure,
        }
    }

    /// The conventional exit code reported for this classification.
    pub fn code(&self) -> i32 {
        match self {
            ExitClassification::Success => 0,
            ExitClassification::Timeout => 124,
            ExitClassification::SpawnFailure => 125,
            ExitClassification::ForceKilled => 137,
            ExitClassification::GenericFailure => 1,
        }
    }

    /// Whether this classification counts as a successful task.
    pub fn is_success(&self) -> bool {
        matches!(self, ExitClassification::Success)
    }
}

impl std::fmt::Display for ExitClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitClassification::Success => write!(f, "success"),
            ExitClassification::GenericFailure => write!(f, "generic_failure"),
            ExitClassification::Timeout => write!(f, "timeout"),
            ExitClassification::ForceKilled => write!(f, "force_killed"),
            ExitClassification::SpawnFailure => write!(f, "spawn_failure"),
        }
    }
}

/// A single task in the execution graph.
///
/// Tasks carry everything the supervisor needs: the worker command, the
/// timeout budget, and the set of paths the worker will write (used for
/// planning-time conflict detection between same-level tasks).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable name for the task.
    pub name: String,
    /// The worker command this task delegates to.
    pub worker: WorkerSpec,
    /// IDs of tasks that must succeed before this task may run.
    pub dependencies: HashSet<TaskId>,
    /// Workspace paths this task's worker will write.
    pub touches: HashSet<PathBuf>,
    /// Soft timeout after which SIGTERM is sent.
    pub timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub grace_period: Duration,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Number of times this task has been attempted.
    pub attempt_count: u32,
    /// Classified outcome of the most recent attempt.
    pub exit_classification: Option<ExitClassification>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the most recent attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the most recent attempt ended.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new task with the given name and worker command.
    ///
    /// The task starts Pending with default timeout/grace budgets and no
    /// dependencies or touched paths.
    pub fn new(name: &str, worker: WorkerSpec) -> Self {
        Self {
            id: TaskId::new(),
            name: name.to_string(),
            worker,
            dependencies: HashSet::new(),
            touches: HashSet::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            grace_period: Duration::from_secs(DEFAULT_GRACE_SECS),
            status: TaskStatus::Pending,
            attempt_count: 0,
            exit_classification: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Set the timeout budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the grace period.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Declare a workspace path this task will write.
    pub fn with_touch(mut self, path: impl Into<PathBuf>) -> Self {
        self.touches.insert(path.into());
        self
    }

    /// Mark the task as ready for execution.
    ///
    /// Valid only once every dependency has succeeded; the graph enforces
    /// this by construction of the execution levels.
    pub fn mark_ready(&mut self) {
        self.status = TaskStatus::Ready;
    }

    /// Start an attempt: transition to Running and record the start time.
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.attempt_count += 1;
        self.started_at = Some(Utc::now());
    }

    /// Record a classified outcome and transition to the terminal status.
    pub fn finish(&mut self, classification: ExitClassification) {
        self.exit_classification = Some(classification);
        self.ended_at = Some(Utc::now());
        self.status = if classification.is_success() {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed {
                error: classification.to_string(),
            }
        };
    }

    /// Mark the task as skipped by operator decision.
    pub fn skip(&mut self) {
        self.status = TaskStatus::Skipped;
        self.ended_at = Some(Utc::now());
    }

    /// Check if the task is in a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Succeeded | TaskStatus::Failed { .. } | TaskStatus::Skipped
        )
    }

    /// Check if the task can be scheduled (Pending or Ready).
    pub fn can_start(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Ready)
    }
}
