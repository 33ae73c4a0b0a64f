//! Timeout, grace period, and kill behavior of the process supervisor.

use std::time::{Duration, Instant};

use crate::fixtures::{shell_task, TestWorkspace};
use foreman::core::task::ExitClassification;
use foreman::exec::supervisor::ProcessSupervisor;

#[tokio::test]
async fn exit_codes_classify_per_table() {
    let ws = TestWorkspace::new();
    let sup = ProcessSupervisor::new(ws.log_dir());

    let cases = [
        ("exit 0", ExitClassification::Success, 0),
        ("exit 1", ExitClassification::GenericFailure, 1),
        ("exit 42", ExitClassification::GenericFailure, 42),
    ];
    for (script, expected, code) in cases {
        let outcome = sup.run(&shell_task("case", script)).await.unwrap();
        assert_eq!(outcome.classification, expected);
        assert_eq!(outcome.exit_code, Some(code));
        assert_eq!(outcome.classification.code(), if code == 0 { 0 } else { 1 });
    }
}

#[tokio::test]
async fn hung_worker_is_never_success() {
    let ws = TestWorkspace::new();
    let sup = ProcessSupervisor::new(ws.log_dir());
    let task = shell_task("hang", "sleep 600")
        .with_timeout(Duration::from_millis(200))
        .with_grace_period(Duration::from_millis(300));

    let started = Instant::now();
    let outcome = sup.run(&task).await.unwrap();
    let elapsed = started.elapsed();

    assert!(matches!(
        outcome.classification,
        ExitClassification::Timeout | ExitClassification::ForceKilled
    ));
    // Wall clock stays in the timeout+grace neighborhood, far from the
    // worker's own 600s sleep.
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
}

#[tokio::test]
async fn term_honored_within_grace_is_timeout() {
    let ws = TestWorkspace::new();
    let sup = ProcessSupervisor::new(ws.log_dir());
    let task = shell_task("politely-hung", "sleep 600")
        .with_timeout(Duration::from_millis(200))
        .with_grace_period(Duration::from_secs(5));

    let outcome = sup.run(&task).await.unwrap();

    assert_eq!(outcome.classification, ExitClassification::Timeout);
    assert_eq!(outcome.classification.code(), 124);
}

#[tokio::test]
async fn term_ignored_escalates_to_force_kill() {
    let ws = TestWorkspace::new();
    let sup = ProcessSupervisor::new(ws.log_dir());
    let task = shell_task("stubborn", "trap '' TERM; while true; do sleep 0.05; done")
        .with_timeout(Duration::from_millis(200))
        .with_grace_period(Duration::from_millis(300));

    let started = Instant::now();
    let outcome = sup.run(&task).await.unwrap();

    assert_eq!(outcome.classification, ExitClassification::ForceKilled);
    assert_eq!(outcome.classification.code(), 137);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn spawn_failure_yields_code_125_outcome() {
    let ws = TestWorkspace::new();
    let sup = ProcessSupervisor::new(ws.log_dir());
    let task = foreman::core::task::Task::new(
        "ghost",
        foreman::exec::worker::WorkerSpec::new("/definitely/not/a/binary"),
    );

    let outcome = sup.run(&task).await.unwrap();

    assert_eq!(outcome.classification, ExitClassification::SpawnFailure);
    assert_eq!(outcome.classification.code(), 125);
    assert_eq!(outcome.exit_code, None);
}

#[tokio::test]
async fn each_task_gets_its_own_log_file() {
    let ws = TestWorkspace::new();
    let sup = ProcessSupervisor::new(ws.log_dir());

    let a = shell_task("loud-a", "echo from-a");
    let b = shell_task("loud-b", "echo from-b");
    let out_a = sup.run(&a).await.unwrap();
    let out_b = sup.run(&b).await.unwrap();

    assert_ne!(out_a.log_path, out_b.log_path);
    let content_a = std::fs::read_to_string(&out_a.log_path).unwrap();
    let content_b = std::fs::read_to_string(&out_b.log_path).unwrap();
    assert!(content_a.contains("from-a"));
    assert!(!content_a.contains("from-b"));
    assert!(content_b.contains("from-b"));
}
