//! A single named validation stage.
//!
//! Validation levels are ordered command stages (syntax check, unit tests,
//! integration run) executed after task levels complete. Unlike task workers,
//! validation commands run in the foreground of the loop and their combined
//! output is captured in memory, because the remediation catalog matches
//! against that output.

use crate::error::Result;
use crate::exec::worker::WorkerSpec;
use crate::flog_debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;

/// One validation stage: a name and an ordered command list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationLevel {
    /// Stage name, e.g. "syntax" or "unit-tests".
    pub name: String,
    /// Commands executed in declared order; the stage fails at the first
    /// non-zero exit.
    pub commands: Vec<WorkerSpec>,
    /// Whether the stage passed on its most recent run.
    #[serde(default)]
    pub passed: bool,
}

/// Result of running one stage once.
#[derive(Debug, Clone)]
pub struct StageRun {
    pub passed: bool,
    /// Combined stdout/stderr of the failing command, empty on success.
    pub output: String,
}

impl ValidationLevel {
    /// Create a stage from shell command strings.
    pub fn new<I>(name: &str, commands: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            name: name.to_string(),
            commands: commands
                .into_iter()
                .map(|c| WorkerSpec::shell(c.as_ref()))
                .collect(),
            passed: false,
        }
    }

    /// Run every command of this stage in order inside `workspace`.
    ///
    /// Stops at the first failing command and captures its combined output
    /// for remediation matching. Commands that cannot be spawned count as
    /// failures with the spawn error as output.
    pub async fn run(&mut self, workspace: &Path) -> Result<StageRun> {
        for (i, spec) in self.commands.iter().enumerate() {
            let mut cmd = spec.command();
            cmd.current_dir(workspace)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let output = match cmd.output().await {
                Ok(output) => output,
                Err(err) => {
                    self.passed = false;
                    return Ok(StageRun {
                        passed: false,
                        output: format!("failed to spawn {}: {}", spec.program, err),
                    });
                }
            };

            if !output.status.success() {
                flog_debug!(
                    "validation stage {} failed at command {} (exit {:?})",
                    self.name,
                    i,
                    output.status.code()
                );
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                self.passed = false;
                return Ok(StageRun {
                    passed: false,
                    output: combined,
                });
            }
        }

        self.passed = true;
        Ok(StageRun {
            passed: true,
            output: String::new(),
        })
    }
}
