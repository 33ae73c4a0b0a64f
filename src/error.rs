use thiserror::Error;

use crate::core::task::TaskId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Unknown task name in plan: {0}")]
    UnknownTaskName(String),

    #[error("Dependency from {from} to {to} would create a cycle")]
    Cycle { from: String, to: String },

    #[error("Tasks {a} and {b} in level {level} both touch {path}")]
    TouchConflict {
        a: String,
        b: String,
        level: usize,
        path: String,
    },

    #[error("Failed to spawn worker for task {task}: {source}")]
    Spawn {
        task: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker binary not found: {0}")]
    WorkerNotFound(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Level {0} failed")]
    LevelFailed(usize),

    #[error("Validation exhausted after {attempts} attempts")]
    ValidationExhausted { attempts: u32 },

    #[error("Quality gate rejected artifact (score {score}, threshold {threshold})")]
    QualityGate { score: u8, threshold: u8 },

    #[error("Run aborted by operator")]
    OperatorAbort,

    #[error("Tracker sink error: {0}")]
    Tracker(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Plan error: {0}")]
    Plan(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Planning errors are configuration mistakes and must never be retried.
    pub fn is_planning(&self) -> bool {
        matches!(
            self,
            Error::Cycle { .. }
                | Error::TouchConflict { .. }
                | Error::UnknownTaskName(_)
                | Error::Plan(_)
        )
    }
}
