//! Worker command specification.
//!
//! A worker is an opaque external program (typically an LLM-driven CLI agent)
//! invoked by a task. The orchestrator never interprets worker output beyond
//! capturing it to a log file and, for gate artifacts, extracting a numeric
//! score. The process-level contract is: exit code, timeout compliance, and
//! the captured log streams.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::process::Command;

/// Specification of the external command a task delegates to.
///
/// The prompt payload, when present, is passed as the final argument so the
/// worker program decides how to use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments preceding the prompt payload.
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional prompt payload appended as the last argument.
    #[serde(default)]
    pub prompt: Option<String>,
}

impl WorkerSpec {
    /// Create a worker spec for a bare program with no arguments.
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            prompt: None,
        }
    }

    /// Create a worker that runs a shell snippet via `sh -c`.
    ///
    /// Used heavily in tests, where workers are plain shell commands.
    pub fn shell(script: &str) -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            prompt: None,
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Attach a prompt payload.
    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }

    /// Resolve the program to an absolute path on the current PATH.
    ///
    /// # Errors
    /// Returns `WorkerNotFound` if the binary cannot be located.
    pub fn resolve(&self) -> Result<PathBuf> {
        which::which(&self.program).map_err(|_| Error::WorkerNotFound(self.program.clone()))
    }

    /// Build the tokio command for this worker.
    ///
    /// Stdio configuration and working directory are the supervisor's
    /// responsibility.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(prompt) = &self.prompt {
            cmd.arg(prompt);
        }
        cmd
    }
}
