//! Bounded validation loop, remediation, and gate properties.

use std::sync::Arc;

use crate::fixtures::TestWorkspace;
use foreman::audit::{AuditEvent, AuditLog, RunId};
use foreman::gate::{Decision, QualityGate};
use foreman::validate::{RemediationCatalog, ValidationLevel, ValidationLoop};

fn audit(ws: &TestWorkspace) -> AuditLog {
    AuditLog::open(ws.path.join("audit.jsonl")).unwrap()
}

#[tokio::test]
async fn always_failing_stage_terminates_in_exactly_max_attempts() {
    let ws = TestWorkspace::new();
    let counter = ws.path.join("runs");
    let looper = ValidationLoop::new(
        &ws.path,
        Arc::new(RemediationCatalog::empty()),
        RunId::new(),
    );
    let mut stages = vec![ValidationLevel::new(
        "doomed",
        vec![&format!(
            "echo x >> {}; echo inscrutable error; exit 1",
            counter.display()
        )],
    )];
    let mut log = audit(&ws);

    let result = looper.run(&mut stages, 5, &mut log).await.unwrap();

    assert!(!result.passed);
    assert_eq!(result.attempts_used, 5);
    assert_eq!(result.blockers.len(), 5);
    let runs = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(runs.lines().count(), 5, "exactly one run per attempt");
}

#[tokio::test]
async fn catalog_hit_passes_on_second_attempt() {
    let ws = TestWorkspace::new();
    let fix_marker = ws.path.join("patched");
    let catalog = RemediationCatalog::empty().with_entry(
        "missing patch",
        &format!("touch {}", fix_marker.display()),
    );
    let looper = ValidationLoop::new(&ws.path, Arc::new(catalog), RunId::new());
    let mut stages = vec![ValidationLevel::new(
        "patchable",
        vec![&format!(
            "test -f {} || {{ echo missing patch; exit 1; }}",
            fix_marker.display()
        )],
    )];
    let mut log = audit(&ws);

    let result = looper.run(&mut stages, 5, &mut log).await.unwrap();

    assert!(result.passed);
    assert_eq!(result.attempts_used, 2);
    assert!(result.blockers.is_empty());
}

#[tokio::test]
async fn later_stages_only_run_after_earlier_ones_pass() {
    let ws = TestWorkspace::new();
    let second_ran = ws.path.join("second-ran");
    let looper = ValidationLoop::new(
        &ws.path,
        Arc::new(RemediationCatalog::empty()),
        RunId::new(),
    );
    let mut stages = vec![
        ValidationLevel::new("first", vec!["echo nope; exit 1"]),
        ValidationLevel::new(
            "second",
            vec![&format!("touch {}", second_ran.display())],
        ),
    ];
    let mut log = audit(&ws);

    let result = looper.run(&mut stages, 2, &mut log).await.unwrap();

    assert!(!result.passed);
    assert!(
        !second_ran.exists(),
        "second stage must not run while the first fails"
    );
}

#[tokio::test]
async fn loop_attempts_are_audited() {
    let ws = TestWorkspace::new();
    let looper = ValidationLoop::new(
        &ws.path,
        Arc::new(RemediationCatalog::empty()),
        RunId::new(),
    );
    let mut stages = vec![ValidationLevel::new("doomed", vec!["exit 1"])];
    let audit_path = ws.path.join("audit.jsonl");
    let mut log = AuditLog::open(&audit_path).unwrap();

    looper.run(&mut stages, 3, &mut log).await.unwrap();
    drop(log);

    let records = AuditLog::read_records(&audit_path).unwrap();
    let attempts = records
        .iter()
        .filter(|r| r.event == AuditEvent::ValidationAttempt)
        .count();
    let blockers = records
        .iter()
        .filter(|r| r.event == AuditEvent::BlockerRecorded)
        .count();
    assert_eq!(attempts, 3);
    assert_eq!(blockers, 3);
}

#[test]
fn gate_fails_closed_and_regenerates_below_threshold() {
    let gate = QualityGate::new(8);

    // Missing or corrupt score reads as zero and can never pass.
    assert_eq!(gate.extract_score("no score anywhere"), 0);
    assert_eq!(
        gate.evaluate("garbage", 0, 0),
        Decision::Regenerate { score: 0 }
    );

    // 6 < 8 regenerates; a regenerated 9 >= 8 passes.
    assert_eq!(
        gate.evaluate("Score: 6/10", 0, 0),
        Decision::Regenerate { score: 6 }
    );
    assert_eq!(
        gate.evaluate("Score: 9/10", 1, 6),
        Decision::Pass { score: 9 }
    );
}

#[test]
fn gate_forces_a_terminal_decision_after_budget() {
    let gate = QualityGate::new(8).with_max_regenerations(2);

    let near = gate.evaluate("Score: 6/10", 2, 6);
    assert!(near.is_terminal());
    assert_eq!(near, Decision::AcceptWithWarning { best_score: 6 });

    let far = gate.evaluate("Score: 1/10", 2, 3);
    assert_eq!(far, Decision::Abort { best_score: 3 });
}
