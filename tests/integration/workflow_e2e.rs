//! Full workflow runs through the driver: planning, execution, validation,
//! gate, and the audit trail.

use crate::fixtures::TestWorkspace;
use foreman::audit::{AuditEvent, AuditLog};
use foreman::error::Error;
use foreman::gate::Decision;
use foreman::plan::Plan;
use foreman::run::{EscalationPolicy, RunStatus, WorkflowRun};

fn load(ws: &TestWorkspace, content: &str) -> Plan {
    Plan::load(ws.write_plan(content)).unwrap()
}

#[tokio::test]
async fn multi_level_plan_with_validation_and_gate_completes() {
    let ws = TestWorkspace::new();
    let artifact = ws.path.join("PRP.md");
    let plan = load(
        &ws,
        &format!(
            r#"
name = "feature"

[assembly]
worker = "true"
artifact = "PRP.md"

[[task]]
name = "research-a"
worker = "echo a > {dir}/a.txt"
touches = ["a.txt"]

[[task]]
name = "research-b"
worker = "echo b > {dir}/b.txt"
touches = ["b.txt"]

[[task]]
name = "assemble"
worker = "cat {dir}/a.txt {dir}/b.txt > {artifact}; printf 'Score: 9/10\n' >> {artifact}"
depends_on = ["research-a", "research-b"]

[[validation]]
name = "artifact-exists"
commands = ["test -f {artifact}"]
"#,
            dir = ws.path.display(),
            artifact = artifact.display()
        ),
    );

    let ctx = ws.context();
    let audit_path = ctx.audit_path();
    let report = WorkflowRun::new(plan, ctx).execute().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.levels_executed, 2);
    assert_eq!(report.tasks_succeeded, 3);
    assert_eq!(report.gate_decision, Some(Decision::Pass { score: 9 }));
    let validation = report.validation.unwrap();
    assert!(validation.passed);
    assert_eq!(validation.attempts_used, 1);

    // The audit trail brackets the run and covers every task.
    let records = AuditLog::read_records(&audit_path).unwrap();
    let events: Vec<_> = records.iter().map(|r| r.event).collect();
    assert_eq!(events.first(), Some(&AuditEvent::RunStarted));
    assert_eq!(events.last(), Some(&AuditEvent::RunCompleted));
    let finished = events
        .iter()
        .filter(|e| **e == AuditEvent::TaskFinished)
        .count();
    assert_eq!(finished, 3);
}

#[tokio::test]
async fn planning_cycle_fails_before_anything_runs() {
    let ws = TestWorkspace::new();
    let marker = ws.path.join("ran");
    let plan = load(
        &ws,
        &format!(
            r#"
[[task]]
name = "a"
worker = "touch {m}"
depends_on = ["b"]

[[task]]
name = "b"
worker = "touch {m}"
depends_on = ["a"]
"#,
            m = marker.display()
        ),
    );

    let result = WorkflowRun::new(plan, ws.context()).execute().await;

    assert!(matches!(result, Err(Error::Cycle { .. })));
    assert!(!marker.exists(), "no worker may run on a planning error");
}

#[tokio::test]
async fn touch_conflict_fails_before_anything_runs() {
    let ws = TestWorkspace::new();
    let plan = load(
        &ws,
        r#"
[[task]]
name = "w1"
worker = "true"
touches = ["src/shared.rs"]

[[task]]
name = "w2"
worker = "true"
touches = ["src/shared.rs"]
"#,
    );

    let result = WorkflowRun::new(plan, ws.context()).execute().await;
    match result {
        Err(err) => assert!(err.is_planning()),
        Ok(_) => panic!("conflicting plan must not execute"),
    }
}

#[tokio::test]
async fn abort_policy_surfaces_operator_abort() {
    let ws = TestWorkspace::new();
    let plan = load(
        &ws,
        r#"
[[task]]
name = "bad"
worker = "exit 1"

[[task]]
name = "never"
worker = "true"
depends_on = ["bad"]
"#,
    );

    let result = WorkflowRun::new(plan, ws.context())
        .with_policy(EscalationPolicy::AbortRun)
        .execute()
        .await;

    assert!(matches!(result, Err(Error::OperatorAbort)));
}

#[tokio::test]
async fn skip_policy_runs_independent_work_to_completion() {
    let ws = TestWorkspace::new();
    let independent = ws.path.join("independent-ran");
    let downstream = ws.path.join("downstream-ran");
    let plan = load(
        &ws,
        &format!(
            r#"
[[task]]
name = "bad"
worker = "exit 1"

[[task]]
name = "downstream"
worker = "touch {}"
depends_on = ["bad"]

[[task]]
name = "independent"
worker = "touch {}"
"#,
            downstream.display(),
            independent.display()
        ),
    );

    let report = WorkflowRun::new(plan, ws.context())
        .with_policy(EscalationPolicy::SkipAndContinue)
        .execute()
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(independent.exists());
    assert!(!downstream.exists());
    assert_eq!(report.tasks_failed, 1);
    assert_eq!(report.tasks_skipped, 1);
    assert_eq!(report.tasks_succeeded, 1);
}

#[tokio::test]
async fn validation_exhaustion_escalates_with_blockers() {
    let ws = TestWorkspace::new();
    let mut ctx = ws.context();
    ctx.max_attempts = 3;
    let plan = load(
        &ws,
        r#"
[[task]]
name = "ok"
worker = "true"

[[validation]]
name = "broken"
commands = ["echo nobody knows this error; exit 1"]
"#,
    );

    let report = WorkflowRun::new(plan, ctx).execute().await.unwrap();

    assert_eq!(report.status, RunStatus::Escalated);
    let validation = report.validation.unwrap();
    assert_eq!(validation.attempts_used, 3);
    assert_eq!(validation.blockers.len(), 3);
    assert!(validation.blockers[0].excerpt.contains("nobody knows"));
}

#[tokio::test]
async fn gate_regeneration_rewrites_artifact_until_pass() {
    let ws = TestWorkspace::new();
    let artifact = ws.path.join("PRP.md");
    std::fs::write(&artifact, "draft\nScore: 5/10\n").unwrap();
    let plan = load(
        &ws,
        &format!(
            r#"
[assembly]
worker = "printf 'final\nScore: 10/10\n' > {}"
artifact = "PRP.md"

[[task]]
name = "noop"
worker = "true"
"#,
            artifact.display()
        ),
    );

    let report = WorkflowRun::new(plan, ws.context()).execute().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.gate_decision, Some(Decision::Pass { score: 10 }));
}

#[tokio::test]
async fn remediation_catalog_feeds_the_run_loop() {
    let ws = TestWorkspace::new();
    let catalog_path = ws.path.join("remediations.toml");
    let flag = ws.path.join("flag");
    std::fs::write(
        &catalog_path,
        format!(
            r#"
[[entry]]
signature = "flag absent"
fix = "touch {}"
"#,
            flag.display()
        ),
    )
    .unwrap();

    let mut ctx = ws.context();
    ctx.remediation_catalog = Some(catalog_path);
    let plan = load(
        &ws,
        &format!(
            r#"
[[task]]
name = "ok"
worker = "true"

[[validation]]
name = "flagged"
commands = ["test -f {} || {{ echo flag absent; exit 1; }}"]
"#,
            flag.display()
        ),
    );

    let report = WorkflowRun::new(plan, ctx).execute().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    let validation = report.validation.unwrap();
    assert!(validation.passed);
    assert_eq!(validation.attempts_used, 2);
}
