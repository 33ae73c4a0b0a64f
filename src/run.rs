//! The workflow run driver.
//!
//! Drives one plan through the full state machine: planning, level-by-level
//! execution, the bounded validation loop, and the quality gate. A failed
//! level escalates according to the configured policy; abort force-kills all
//! still-running supervisors as a batch through the shared cancellation
//! token. Planning errors are fatal and never retried.

use crate::audit::{AuditEvent, AuditLog, AuditRecord, RunId, TaskAuditBuffer};
use crate::config::RunContext;
use crate::core::graph::{DependencyGraph, ExecutionLevel};
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::exec::executor::{level_failed, ParallelExecutor};
use crate::exec::supervisor::{Outcome, ProcessSupervisor};
use crate::gate::{Decision, QualityGate};
use crate::plan::Plan;
use crate::tracker::TrackerHandle;
use crate::validate::{LoopResult, RemediationCatalog, ValidationLoop};
use crate::{flog, flog_warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Retries granted per level under the retry policy before giving up.
const MAX_LEVEL_RETRIES: u32 = 3;

/// What to do when a level fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationPolicy {
    /// Re-run the failed level, up to a bounded number of retries.
    RetryLevel,
    /// Skip the failures; downstream tasks with unmet dependencies are
    /// skipped too.
    SkipAndContinue,
    /// Force-kill everything still running and abort the run.
    AbortRun,
}

/// Terminal status of a run that produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Escalated,
}

/// Summary handed back to the CLI when the run terminates.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub plan_name: String,
    pub status: RunStatus,
    pub levels_executed: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub tasks_skipped: usize,
    pub validation: Option<LoopResult>,
    pub gate_decision: Option<Decision>,
    pub warnings: Vec<String>,
    pub audit_path: PathBuf,
}

impl RunReport {
    /// Whether the run ended in a state the operator can accept.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// One workflow run over one plan.
pub struct WorkflowRun {
    plan: Plan,
    ctx: RunContext,
    policy: EscalationPolicy,
    tracker: TrackerHandle,
    cancel: CancellationToken,
}

impl WorkflowRun {
    /// Create a run with the abort-on-failure policy and no tracker.
    pub fn new(plan: Plan, ctx: RunContext) -> Self {
        Self {
            plan,
            ctx,
            policy: EscalationPolicy::AbortRun,
            tracker: TrackerHandle::noop(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_tracker(mut self, tracker: TrackerHandle) -> Self {
        self.tracker = tracker;
        self
    }

    /// Token that force-kills every running supervisor when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the plan to a terminal state.
    ///
    /// # Errors
    /// Planning errors (cycles, touch conflicts, unknown names) are fatal.
    /// An abort escalation returns `OperatorAbort`. Validation or gate
    /// exhaustion is not an error: the report comes back `Escalated`.
    pub async fn execute(self) -> Result<RunReport> {
        let run_id = self.ctx.run_id;
        let mut audit = AuditLog::open(self.ctx.audit_path())?;
        flog!(
            "run {} starting: plan {}, {} task(s)",
            run_id.short(),
            self.plan.name,
            self.plan.task_count()
        );

        // Planning. Fatal on cycle or touch conflict, never retried.
        let mut graph = self.plan.build_graph()?;
        let levels = graph.levels()?;
        audit.append(
            &AuditRecord::new(run_id, AuditEvent::RunStarted)
                .detail(format!("plan {}, {} level(s)", self.plan.name, levels.len())),
        )?;

        for task in graph.all_tasks() {
            self.tracker.create_task(task);
        }

        let supervisor =
            ProcessSupervisor::with_cancellation(&self.ctx.log_dir, self.cancel.clone());
        let mut executor = ParallelExecutor::new(supervisor);
        if let Some(limit) = self.ctx.max_concurrency {
            executor = executor.with_max_concurrency(limit);
        }

        let mut warnings = Vec::new();
        let mut levels_executed = 0;

        for level in &levels {
            // A false return means SkipAndContinue left failures behind;
            // later levels skip their own unmet dependencies.
            self.execute_level(&mut graph, &executor, level, &mut audit, &mut warnings)
                .await?;
            levels_executed += 1;
        }

        // Validation.
        let mut validation = None;
        let mut stages = self.plan.validation_levels();
        if !stages.is_empty() {
            let catalog = match &self.ctx.remediation_catalog {
                Some(path) => RemediationCatalog::load(path)?,
                None => RemediationCatalog::empty(),
            };
            let looper =
                ValidationLoop::new(&self.ctx.workspace, Arc::new(catalog), run_id);
            let result = looper
                .run(&mut stages, self.ctx.max_attempts, &mut audit)
                .await?;
            if !result.passed {
                audit.append(&AuditRecord::new(run_id, AuditEvent::RunEscalated).detail(
                    format!(
                        "validation exhausted after {} attempt(s), {} blocker(s)",
                        result.attempts_used,
                        result.blockers.len()
                    ),
                ))?;
                return Ok(self.report(
                    RunStatus::Escalated,
                    levels_executed,
                    &graph,
                    Some(result),
                    None,
                    warnings,
                ));
            }
            validation = Some(result);
        }

        // Quality gate.
        let mut gate_decision = None;
        if self.plan.assembly.is_some() {
            let decision = self.run_gate(&mut audit, &mut warnings).await?;
            if !decision.is_acceptable() {
                audit.append(
                    &AuditRecord::new(run_id, AuditEvent::RunEscalated)
                        .detail(decision.to_string()),
                )?;
                return Ok(self.report(
                    RunStatus::Escalated,
                    levels_executed,
                    &graph,
                    validation,
                    Some(decision),
                    warnings,
                ));
            }
            gate_decision = Some(decision);
        }

        audit.append(&AuditRecord::new(run_id, AuditEvent::RunCompleted))?;
        flog!("run {} completed", run_id.short());
        Ok(self.report(
            RunStatus::Completed,
            levels_executed,
            &graph,
            validation,
            gate_decision,
            warnings,
        ))
    }

    /// Execute one level, including retries and skip handling.
    ///
    /// Returns whether the level ultimately passed.
    async fn execute_level(
        &self,
        graph: &mut DependencyGraph,
        executor: &ParallelExecutor,
        level: &ExecutionLevel,
        audit: &mut AuditLog,
        warnings: &mut Vec<String>,
    ) -> Result<bool> {
        let run_id = self.ctx.run_id;
        let runnable = self.skip_unmet(graph, level, audit)?;
        if runnable.tasks.is_empty() {
            audit.append(
                &AuditRecord::new(run_id, AuditEvent::LevelSkipped).level(level.index),
            )?;
            return Ok(false);
        }

        let mut retries = 0;
        loop {
            audit.append(
                &AuditRecord::new(run_id, AuditEvent::LevelStarted)
                    .level(level.index)
                    .attempt(retries + 1),
            )?;

            let outcomes = executor.run_level(graph, &runnable).await?;
            self.record_outcomes(graph, &runnable, &outcomes, audit)?;

            if !level_failed(&outcomes) {
                audit.append(
                    &AuditRecord::new(run_id, AuditEvent::LevelCompleted).level(level.index),
                )?;
                return Ok(true);
            }

            audit.append(
                &AuditRecord::new(run_id, AuditEvent::LevelFailed).level(level.index),
            )?;

            match self.policy {
                EscalationPolicy::RetryLevel if retries < MAX_LEVEL_RETRIES => {
                    retries += 1;
                    flog_warn!(
                        "level {} failed, retry {}/{}",
                        level.index,
                        retries,
                        MAX_LEVEL_RETRIES
                    );
                    audit.append(
                        &AuditRecord::new(run_id, AuditEvent::LevelRetried)
                            .level(level.index)
                            .attempt(retries),
                    )?;
                }
                EscalationPolicy::RetryLevel => {
                    return Err(Error::LevelFailed(level.index));
                }
                EscalationPolicy::SkipAndContinue => {
                    warnings.push(format!(
                        "level {} failed, continuing per policy",
                        level.index
                    ));
                    return Ok(false);
                }
                EscalationPolicy::AbortRun => {
                    flog_warn!("level {} failed, aborting run", level.index);
                    self.cancel.cancel();
                    audit.append(
                        &AuditRecord::new(run_id, AuditEvent::RunAborted).level(level.index),
                    )?;
                    return Err(Error::OperatorAbort);
                }
            }
        }
    }

    /// Skip level members whose dependencies did not all succeed and return
    /// the runnable remainder.
    fn skip_unmet(
        &self,
        graph: &mut DependencyGraph,
        level: &ExecutionLevel,
        audit: &mut AuditLog,
    ) -> Result<ExecutionLevel> {
        let mut runnable = Vec::new();
        for id in &level.tasks {
            let deps_met = {
                let task = graph.get_task(id).ok_or(Error::TaskNotFound(*id))?;
                task.dependencies.iter().all(|dep| {
                    matches!(
                        graph.get_task(dep).map(|t| &t.status),
                        Some(TaskStatus::Succeeded)
                    )
                })
            };
            if deps_met {
                runnable.push(*id);
            } else {
                let task = graph.get_task_mut(id).ok_or(Error::TaskNotFound(*id))?;
                task.skip();
                let task = graph.get_task(id).ok_or(Error::TaskNotFound(*id))?;
                self.tracker.update_status(task, &TaskStatus::Skipped);
                audit.append(
                    &AuditRecord::new(self.ctx.run_id, AuditEvent::TaskFinished)
                        .level(level.index)
                        .task(*id)
                        .detail("skipped: unmet dependencies"),
                )?;
            }
        }
        Ok(ExecutionLevel {
            index: level.index,
            tasks: runnable,
        })
    }

    /// Merge per-task audit buffers into the run log and mirror statuses to
    /// the tracker. Runs strictly after the level barrier.
    fn record_outcomes(
        &self,
        graph: &DependencyGraph,
        level: &ExecutionLevel,
        outcomes: &HashMap<TaskId, Outcome>,
        audit: &mut AuditLog,
    ) -> Result<()> {
        for id in &level.tasks {
            let Some(outcome) = outcomes.get(id) else {
                continue;
            };
            let mut buffer = TaskAuditBuffer::new();
            buffer.push(
                AuditRecord::new(self.ctx.run_id, AuditEvent::TaskFinished)
                    .level(level.index)
                    .task(*id)
                    .classification(outcome.classification)
                    .duration_ms(outcome.duration.as_millis() as u64),
            );
            audit.merge(&mut buffer)?;

            if let Some(task) = graph.get_task(id) {
                self.tracker.update_status(task, &task.status);
            }
        }
        Ok(())
    }

    /// Evaluate the gate artifact, regenerating through the assembly worker
    /// while budget remains.
    async fn run_gate(
        &self,
        audit: &mut AuditLog,
        warnings: &mut Vec<String>,
    ) -> Result<Decision> {
        let assembly = self
            .plan
            .assembly
            .as_ref()
            .ok_or_else(|| Error::Plan("gate invoked without an assembly section".into()))?;
        let gate = QualityGate::new(self.ctx.quality_threshold)
            .with_max_regenerations(self.ctx.max_regenerations);
        let artifact_path = self.ctx.workspace.join(&assembly.artifact);
        let supervisor =
            ProcessSupervisor::with_cancellation(&self.ctx.log_dir, self.cancel.clone());

        let mut regenerations = 0;
        let mut best = 0;
        loop {
            // Missing artifact reads as empty and scores zero.
            let text = std::fs::read_to_string(&artifact_path).unwrap_or_default();
            let decision = gate.evaluate(&text, regenerations, best);
            audit.append(
                &AuditRecord::new(self.ctx.run_id, AuditEvent::GateDecision)
                    .attempt(regenerations + 1)
                    .detail(decision.to_string()),
            )?;

            match decision {
                Decision::Regenerate { score } => {
                    best = best.max(score);
                    regenerations += 1;
                    flog!(
                        "gate score {}/10 below {}, regeneration {}/{}",
                        score,
                        gate.threshold(),
                        regenerations,
                        gate.max_regenerations()
                    );
                    let task = Task::new(
                        &format!("assembly-regen-{}", regenerations),
                        assembly.worker(),
                    );
                    let outcome = supervisor.run(&task).await?;
                    if !outcome.is_success() {
                        warnings.push(format!(
                            "assembly regeneration {} failed ({})",
                            regenerations, outcome.classification
                        ));
                    }
                }
                Decision::AcceptWithWarning { best_score } => {
                    warnings.push(format!(
                        "quality gate accepted below threshold (best {}/10, threshold {})",
                        best_score,
                        gate.threshold()
                    ));
                    return Ok(decision);
                }
                Decision::Pass { .. } | Decision::Abort { .. } => return Ok(decision),
            }
        }
    }

    fn report(
        &self,
        status: RunStatus,
        levels_executed: usize,
        graph: &DependencyGraph,
        validation: Option<LoopResult>,
        gate_decision: Option<Decision>,
        warnings: Vec<String>,
    ) -> RunReport {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut skipped = 0;
        for task in graph.all_tasks() {
            match task.status {
                TaskStatus::Succeeded => succeeded += 1,
                TaskStatus::Failed { .. } => failed += 1,
                TaskStatus::Skipped => skipped += 1,
                _ => {}
            }
        }
        RunReport {
            run_id: self.ctx.run_id,
            plan_name: self.plan.name.clone(),
            status,
            levels_executed,
            tasks_succeeded: succeeded,
            tasks_failed: failed,
            tasks_skipped: skipped,
            validation,
            gate_decision,
            warnings,
            audit_path: self.ctx.audit_path(),
        }
    }
}
