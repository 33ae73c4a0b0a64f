//! The bounded validation loop.
//!
//! Runs the validation stages in order, up to a fixed number of attempts.
//! Every failure either gets a catalog remediation applied or is recorded as
//! a blocker; either way the loop proceeds to its next attempt, so it
//! terminates in at most `max_attempts` iterations on persistent failure.
//! Each attempt appends a structured record to the audit log.

use crate::audit::{AuditEvent, AuditLog, AuditRecord, RunId};
use crate::error::Result;
use crate::validate::level::ValidationLevel;
use crate::validate::remediation::RemediationCatalog;
use crate::{flog, flog_warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default attempt budget when the caller does not override it.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Maximum length of a blocker's output excerpt.
const BLOCKER_EXCERPT_LEN: usize = 400;

/// A failure the catalog had no answer for.
#[derive(Debug, Clone)]
pub struct Blocker {
    /// Name of the stage that failed.
    pub stage: String,
    /// Attempt number on which the failure occurred (1-based).
    pub attempt: u32,
    /// Tail of the captured output, for the operator report.
    pub excerpt: String,
}

/// What the loop concluded.
#[derive(Debug, Clone)]
pub struct LoopResult {
    /// Whether every stage eventually passed.
    pub passed: bool,
    /// How many attempts were consumed (1-based; equals `max_attempts` on
    /// exhaustion).
    pub attempts_used: u32,
    /// Unremediated failures accumulated across attempts.
    pub blockers: Vec<Blocker>,
}

/// Drives validation stages through bounded attempts with best-effort
/// remediation.
pub struct ValidationLoop {
    workspace: PathBuf,
    catalog: Arc<RemediationCatalog>,
    run_id: RunId,
}

impl ValidationLoop {
    /// Create a loop running stages inside `workspace` with the given shared
    /// catalog.
    pub fn new(
        workspace: impl Into<PathBuf>,
        catalog: Arc<RemediationCatalog>,
        run_id: RunId,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            catalog,
            run_id,
        }
    }

    /// The workspace validation commands run in.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Run `stages` until all pass or `max_attempts` is exhausted.
    ///
    /// Per attempt the stages run in declared order; the first failure ends
    /// the attempt. A catalog hit applies the fix command before the next
    /// attempt; a miss records a blocker and the next attempt proceeds
    /// anyway. An attempt budget of zero means a single result reporting
    /// zero attempts and no pass.
    ///
    /// # Errors
    /// Only audit-log IO propagates; stage and remediation failures are data.
    pub async fn run(
        &self,
        stages: &mut [ValidationLevel],
        max_attempts: u32,
        audit: &mut AuditLog,
    ) -> Result<LoopResult> {
        let mut blockers = Vec::new();

        for attempt in 1..=max_attempts {
            match self.run_attempt(stages, attempt, audit, &mut blockers).await? {
                true => {
                    flog!("validation passed on attempt {}/{}", attempt, max_attempts);
                    return Ok(LoopResult {
                        passed: true,
                        attempts_used: attempt,
                        blockers,
                    });
                }
                false => {}
            }
        }

        flog_warn!(
            "validation exhausted {} attempt(s) with {} blocker(s)",
            max_attempts,
            blockers.len()
        );
        Ok(LoopResult {
            passed: false,
            attempts_used: max_attempts,
            blockers,
        })
    }

    /// One pass over the stages; returns whether all passed.
    async fn run_attempt(
        &self,
        stages: &mut [ValidationLevel],
        attempt: u32,
        audit: &mut AuditLog,
        blockers: &mut Vec<Blocker>,
    ) -> Result<bool> {
        for stage in stages.iter_mut() {
            let run = stage.run(&self.workspace).await?;
            if run.passed {
                continue;
            }

            audit.append(
                &AuditRecord::new(self.run_id, AuditEvent::ValidationAttempt)
                    .attempt(attempt)
                    .detail(format!("stage {} failed", stage.name)),
            )?;

            if let Some(entry) = self.catalog.lookup(&run.output) {
                let applied = self.catalog.apply(entry, &self.workspace).await;
                audit.append(
                    &AuditRecord::new(self.run_id, AuditEvent::RemediationApplied)
                        .attempt(attempt)
                        .detail(format!(
                            "stage {}: '{}' => {} ({})",
                            stage.name,
                            entry.signature,
                            entry.fix,
                            if applied { "ok" } else { "failed" }
                        )),
                )?;
            } else {
                let blocker = Blocker {
                    stage: stage.name.clone(),
                    attempt,
                    excerpt: tail_excerpt(&run.output),
                };
                audit.append(
                    &AuditRecord::new(self.run_id, AuditEvent::BlockerRecorded)
                        .attempt(attempt)
                        .detail(format!("stage {}: no remediation matched", stage.name)),
                )?;
                blockers.push(blocker);
            }
            return Ok(false);
        }

        audit.append(
            &AuditRecord::new(self.run_id, AuditEvent::ValidationAttempt)
                .attempt(attempt)
                .detail("all stages passed"),
        )?;
        Ok(true)
    }
}

/// Last `BLOCKER_EXCERPT_LEN` characters of the output, on a char boundary.
fn tail_excerpt(output: &str) -> String {
    let trimmed = output.trim_end();
    if trimmed.chars().count() <= BLOCKER_EXCERPT_LEN {
        return trimmed.to_string();
    }
    trimmed
        .chars()
        .skip(trimmed.chars().count() - BLOCKER_EXCERPT_LEN)
        .collect()
}
