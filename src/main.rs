use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use foreman::config::{Config, RunContext};
use foreman::error::Error;
use foreman::flog;
use foreman::plan::Plan;
use foreman::run::{EscalationPolicy, RunReport, RunStatus, WorkflowRun};
use foreman::tracker::{JsonFileTracker, TrackerHandle};
use foreman::Result;

/// Process exit codes: success, exhaustion, planning error, operator abort.
const EXIT_SUCCESS: u8 = 0;
const EXIT_EXHAUSTED: u8 = 1;
const EXIT_PLANNING: u8 = 2;
const EXIT_ABORTED: u8 = 3;

/// Foreman - workflow orchestrator for LLM-driven task pipelines
#[derive(Parser, Debug)]
#[command(name = "foreman")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    FOREMAN_DEBUG=1     Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.foreman/foreman.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do when an execution level fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnFailure {
    /// Re-run the failed level (bounded retries)
    Retry,
    /// Skip the failures and continue with met dependencies only
    Skip,
    /// Kill everything still running and abort
    Abort,
}

impl From<OnFailure> for EscalationPolicy {
    fn from(value: OnFailure) -> Self {
        match value {
            OnFailure::Retry => EscalationPolicy::RetryLevel,
            OnFailure::Skip => EscalationPolicy::SkipAndContinue,
            OnFailure::Abort => EscalationPolicy::AbortRun,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute a plan file end to end
    Run {
        /// Path to the TOML plan file
        plan_file: PathBuf,

        /// Validation loop attempt budget
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Quality gate score threshold (0-10)
        #[arg(long)]
        quality_threshold: Option<u8>,

        /// Cap on concurrently running workers per level
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Escalation policy for a failed level
        #[arg(long, value_enum, default_value_t = OnFailure::Abort)]
        on_failure: OnFailure,
    },

    /// Check a plan file without executing: cycles, conflicts, levels
    Check {
        /// Path to the TOML plan file
        plan_file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    foreman::log::init_with_debug(cli.debug);

    let code = match cli.command {
        Command::Run {
            plan_file,
            max_attempts,
            quality_threshold,
            max_concurrency,
            on_failure,
        } => run_plan(
            plan_file,
            max_attempts,
            quality_threshold,
            max_concurrency,
            on_failure.into(),
        ),
        Command::Check { plan_file } => check_plan(plan_file),
    };
    ExitCode::from(code)
}

/// Execute a plan and translate the result into a process exit code.
fn run_plan(
    plan_file: PathBuf,
    max_attempts: Option<u32>,
    quality_threshold: Option<u8>,
    max_concurrency: Option<usize>,
    policy: EscalationPolicy,
) -> u8 {
    match execute_plan(
        plan_file,
        max_attempts,
        quality_threshold,
        max_concurrency,
        policy,
    ) {
        Ok(report) => {
            print_report(&report);
            match report.status {
                RunStatus::Completed => EXIT_SUCCESS,
                RunStatus::Escalated => EXIT_EXHAUSTED,
            }
        }
        Err(err) if err.is_planning() => {
            eprintln!("Planning error: {}", err);
            EXIT_PLANNING
        }
        Err(Error::OperatorAbort) => {
            eprintln!("Run aborted: a level failed under the abort policy.");
            EXIT_ABORTED
        }
        Err(err) => {
            eprintln!("Run failed: {}", err);
            EXIT_EXHAUSTED
        }
    }
}

fn execute_plan(
    plan_file: PathBuf,
    max_attempts: Option<u32>,
    quality_threshold: Option<u8>,
    max_concurrency: Option<usize>,
    policy: EscalationPolicy,
) -> Result<RunReport> {
    let plan = Plan::load(&plan_file)?;
    flog!(
        "Run command: plan={}, {} task(s)",
        plan.name,
        plan.task_count()
    );

    let config = Config::load()?;
    let workspace = std::env::current_dir()?;
    let mut ctx = RunContext::from_config(&config, workspace)?;
    if let Some(attempts) = max_attempts {
        ctx.max_attempts = attempts;
    }
    if let Some(threshold) = quality_threshold {
        ctx.quality_threshold = threshold.min(10);
    }
    if let Some(limit) = max_concurrency {
        ctx.max_concurrency = Some(limit);
    }

    let tracker = match &ctx.tracker_file {
        Some(path) => TrackerHandle::new(Box::new(JsonFileTracker::new(path))),
        None => TrackerHandle::noop(),
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        WorkflowRun::new(plan, ctx)
            .with_policy(policy)
            .with_tracker(tracker)
            .execute()
            .await
    })
}

/// Validate a plan without executing it and print the level structure.
fn check_plan(plan_file: PathBuf) -> u8 {
    let result = (|| -> Result<()> {
        let plan = Plan::load(&plan_file)?;
        let graph = plan.build_graph()?;
        let levels = graph.levels()?;

        println!("Plan:   {}", plan.name);
        println!("Tasks:  {}", graph.task_count());
        println!("Levels: {}", levels.len());
        for level in &levels {
            let names: Vec<&str> = level
                .tasks
                .iter()
                .filter_map(|id| graph.get_task(id).map(|t| t.name.as_str()))
                .collect();
            println!("  {}: {}", level.index, names.join(", "));
        }
        for task in graph.all_tasks() {
            if task.worker.resolve().is_err() {
                println!(
                    "warning: worker '{}' for task {} not found on PATH",
                    task.worker.program, task.name
                );
            }
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            println!("\nPlan is valid.");
            EXIT_SUCCESS
        }
        Err(err) => {
            eprintln!("Plan check failed: {}", err);
            EXIT_PLANNING
        }
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("════════════════════════════════════════");
    println!("  Run:        {}", report.run_id.short());
    println!("  Plan:       {}", report.plan_name);
    println!(
        "  Status:     {}",
        match report.status {
            RunStatus::Completed => "completed",
            RunStatus::Escalated => "escalated",
        }
    );
    println!("  Levels:     {}", report.levels_executed);
    println!(
        "  Tasks:      {} succeeded, {} failed, {} skipped",
        report.tasks_succeeded, report.tasks_failed, report.tasks_skipped
    );
    if let Some(validation) = &report.validation {
        println!(
            "  Validation: {} in {} attempt(s)",
            if validation.passed { "passed" } else { "failed" },
            validation.attempts_used
        );
        for blocker in &validation.blockers {
            println!(
                "    blocker (attempt {}, stage {}): {}",
                blocker.attempt,
                blocker.stage,
                blocker.excerpt.lines().next().unwrap_or("")
            );
        }
    }
    if let Some(decision) = &report.gate_decision {
        println!("  Gate:       {}", decision);
    }
    for warning in &report.warnings {
        println!("  Warning:    {}", warning);
    }
    println!("  Audit log:  {}", report.audit_path.display());
    println!("════════════════════════════════════════");
}
