//! Process supervision for a single task.
//!
//! The `ProcessSupervisor` runs one worker as an isolated child process,
//! enforcing the task's soft timeout, grace period, and forced kill, and
//! classifies the result. Workers are untrusted, long-running external CLI
//! invocations: a hung worker must never block the orchestrator, and the
//! crash of one worker must not corrupt orchestrator state, which is why
//! supervision happens at the OS-process level rather than in-process.
//!
//! Timeline for one task:
//! - exit before `timeout`: classify the exit code
//! - at `timeout`: send SIGTERM, start the grace timer
//! - at `timeout + grace_period`: SIGKILL
//!
//! The result is `Timeout` when the TERM was honored within the grace period
//! and `ForceKilled` when the hard kill was required.

use crate::core::task::{ExitClassification, Task};
use crate::error::Result;
use crate::{flog_debug, flog_warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

/// The classified result of supervising one task's process execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Classification of how the process ended.
    pub classification: ExitClassification,
    /// Raw exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Wall-clock duration of the supervised execution.
    pub duration: Duration,
    /// Per-task log file holding the worker's combined stdout/stderr.
    pub log_path: PathBuf,
}

impl Outcome {
    /// Whether the supervised process counts as successful.
    pub fn is_success(&self) -> bool {
        self.classification.is_success()
    }
}

/// Supervises one worker process per `run` call.
///
/// Each task gets its own log file under the supervisor's log directory;
/// streams are never shared between tasks, so concurrent workers cannot
/// interleave output.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    /// Directory receiving one log file per supervised task.
    log_dir: PathBuf,
    /// Cancellation for batch abort: when triggered, the supervised child is
    /// killed immediately and classified ForceKilled.
    cancel: CancellationToken,
}

impl ProcessSupervisor {
    /// Create a supervisor writing task logs into `log_dir`.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a supervisor whose children die when `cancel` fires.
    pub fn with_cancellation(log_dir: impl Into<PathBuf>, cancel: CancellationToken) -> Self {
        Self {
            log_dir: log_dir.into(),
            cancel,
        }
    }

    /// The log directory.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Run the task's worker to completion and classify the outcome.
    ///
    /// Spawn failures are reported as a `SpawnFailure` outcome rather than an
    /// error; only log-file IO problems propagate as errors.
    pub async fn run(&self, task: &Task) -> Result<Outcome> {
        let started = Instant::now();
        let log_path = self
            .log_dir
            .join(format!("{}-{}.log", task.name, task.id.short()));

        std::fs::create_dir_all(&self.log_dir)?;
        let stdout_log = std::fs::File::create(&log_path)?;
        let stderr_log = stdout_log.try_clone()?;

        let mut cmd = task.worker.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(stdout_log))
            .stderr(Stdio::from(stderr_log))
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                flog_warn!("spawn failed for task {}: {}", task.name, err);
                return Ok(Outcome {
                    classification: ExitClassification::SpawnFailure,
                    exit_code: None,
                    duration: started.elapsed(),
                    log_path,
                });
            }
        };

        flog_debug!(
            "task {} spawned pid={:?} timeout={:?} grace={:?}",
            task.name,
            child.id(),
            task.timeout,
            task.grace_period
        );

        // The select result carries no borrow of the child, so the
        // escalation and cancellation paths below can take it mutably.
        let waited = tokio::select! {
            waited = tokio::time::timeout(task.timeout, child.wait()) => Some(waited),
            _ = self.cancel.cancelled() => None,
        };

        let (classification, exit_code) = match waited {
            Some(Ok(Ok(status))) => {
                let code = status.code();
                // A signal death before timeout has no exit code; treat it
                // as a generic failure.
                let classification = match code {
                    Some(c) => ExitClassification::from_exit_code(c),
                    None => ExitClassification::GenericFailure,
                };
                (classification, code)
            }
            Some(Ok(Err(err))) => {
                flog_warn!("wait failed for task {}: {}", task.name, err);
                (ExitClassification::GenericFailure, None)
            }
            Some(Err(_)) => self.escalate(&mut child, task).await,
            None => {
                flog_debug!("task {} cancelled, killing", task.name);
                let _ = child.kill().await;
                (ExitClassification::ForceKilled, None)
            }
        };

        flog_debug!(
            "task {} finished: {} in {:?}",
            task.name,
            classification,
            started.elapsed()
        );

        Ok(Outcome {
            classification,
            exit_code,
            duration: started.elapsed(),
            log_path,
        })
    }

    /// Timeout escalation: SIGTERM, wait out the grace period, then SIGKILL.
    async fn escalate(
        &self,
        child: &mut Child,
        task: &Task,
    ) -> (ExitClassification, Option<i32>) {
        flog_debug!(
            "task {} exceeded timeout {:?}, sending SIGTERM",
            task.name,
            task.timeout
        );
        send_term(child);

        match tokio::time::timeout(task.grace_period, child.wait()).await {
            Ok(Ok(status)) => (ExitClassification::Timeout, status.code()),
            Ok(Err(err)) => {
                flog_warn!("wait after SIGTERM failed for task {}: {}", task.name, err);
                (ExitClassification::Timeout, None)
            }
            Err(_) => {
                flog_warn!(
                    "task {} ignored SIGTERM for {:?}, killing",
                    task.name,
                    task.grace_period
                );
                let _ = child.kill().await;
                (ExitClassification::ForceKilled, None)
            }
        }
    }
}

/// Deliver SIGTERM to the child.
///
/// Tokio's `Child` only exposes the non-ignorable kill, so the graceful
/// signal goes through the platform `kill` utility on Unix. On other
/// platforms there is no graceful stage; the grace timer simply elapses into
/// the hard kill.
fn send_term(child: &Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status();
    }
}
