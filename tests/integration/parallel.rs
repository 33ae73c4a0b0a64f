//! Per-level fork/join execution correctness.

use std::time::{Duration, Instant};

use crate::fixtures::{shell_task, TestWorkspace};
use foreman::core::graph::{DependencyGraph, ExecutionLevel};
use foreman::core::task::{Task, TaskId, TaskStatus};
use foreman::exec::executor::{level_failed, ParallelExecutor};
use foreman::exec::supervisor::ProcessSupervisor;

fn level_of(tasks: Vec<Task>) -> (DependencyGraph, ExecutionLevel) {
    let mut graph = DependencyGraph::new();
    let ids: Vec<TaskId> = tasks
        .into_iter()
        .map(|t| {
            let id = t.id;
            graph.add_task(t);
            id
        })
        .collect();
    (
        graph,
        ExecutionLevel {
            index: 0,
            tasks: ids,
        },
    )
}

#[tokio::test]
async fn no_lost_result_under_randomized_delays() {
    let ws = TestWorkspace::new();
    let executor = ParallelExecutor::new(ProcessSupervisor::new(ws.log_dir()));

    // Varied delays and a mix of exit codes so completion order is scrambled.
    let scripts = [
        "sleep 0.05; exit 0",
        "sleep 0.31; exit 0",
        "exit 2",
        "sleep 0.17; exit 0",
        "sleep 0.02; exit 5",
        "sleep 0.23; exit 0",
        "exit 0",
        "sleep 0.11; exit 1",
    ];
    let tasks: Vec<Task> = scripts
        .iter()
        .enumerate()
        .map(|(i, s)| shell_task(&format!("t{}", i), s))
        .collect();
    let (mut graph, level) = level_of(tasks);

    let outcomes = executor.run_level(&mut graph, &level).await.unwrap();

    assert_eq!(outcomes.len(), scripts.len(), "one outcome per task, always");
    for id in &level.tasks {
        assert!(outcomes.contains_key(id));
    }
    let failures = outcomes.values().filter(|o| !o.is_success()).count();
    assert_eq!(failures, 3);
    assert!(level_failed(&outcomes));
}

#[tokio::test]
async fn level_duration_is_max_not_sum() {
    let ws = TestWorkspace::new();
    let executor = ParallelExecutor::new(ProcessSupervisor::new(ws.log_dir()));
    let (mut graph, level) = level_of(vec![
        shell_task("s1", "sleep 0.4"),
        shell_task("s2", "sleep 0.4"),
        shell_task("s3", "sleep 0.4"),
        shell_task("s4", "sleep 0.4"),
    ]);

    let started = Instant::now();
    let outcomes = executor.run_level(&mut graph, &level).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcomes.len(), 4);
    // Four 0.4s sleeps sequentially would take 1.6s; concurrent execution
    // stays well below that.
    assert!(elapsed < Duration::from_millis(1200), "took {:?}", elapsed);
}

#[tokio::test]
async fn failed_sibling_does_not_cancel_the_level() {
    let ws = TestWorkspace::new();
    let executor = ParallelExecutor::new(ProcessSupervisor::new(ws.log_dir()));
    let marker = ws.path.join("survivor");
    let (mut graph, level) = level_of(vec![
        shell_task("dies-first", "exit 1"),
        shell_task(
            "survivor",
            &format!("sleep 0.3; touch {}", marker.display()),
        ),
    ]);

    let outcomes = executor.run_level(&mut graph, &level).await.unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(marker.exists());
    let survivor = graph
        .all_tasks()
        .into_iter()
        .find(|t| t.name == "survivor")
        .unwrap();
    assert!(matches!(survivor.status, TaskStatus::Succeeded));
}

#[tokio::test]
async fn bounded_concurrency_serializes_workers() {
    let ws = TestWorkspace::new();
    let executor =
        ParallelExecutor::new(ProcessSupervisor::new(ws.log_dir())).with_max_concurrency(2);
    let (mut graph, level) = level_of(vec![
        shell_task("s1", "sleep 0.2"),
        shell_task("s2", "sleep 0.2"),
        shell_task("s3", "sleep 0.2"),
        shell_task("s4", "sleep 0.2"),
    ]);

    let started = Instant::now();
    let outcomes = executor.run_level(&mut graph, &level).await.unwrap();

    assert_eq!(outcomes.len(), 4);
    // Two at a time: at least two rounds of 0.2s.
    assert!(started.elapsed() >= Duration::from_millis(350));
}

#[tokio::test]
async fn statuses_are_terminal_after_the_barrier() {
    let ws = TestWorkspace::new();
    let executor = ParallelExecutor::new(ProcessSupervisor::new(ws.log_dir()));
    let (mut graph, level) = level_of(vec![
        shell_task("ok", "exit 0"),
        shell_task("bad", "exit 3"),
    ]);

    executor.run_level(&mut graph, &level).await.unwrap();

    for task in graph.all_tasks() {
        assert!(task.is_finished(), "{} not terminal", task.name);
        assert_eq!(task.attempt_count, 1);
        assert!(task.started_at.is_some());
        assert!(task.ended_at.is_some());
    }
}
