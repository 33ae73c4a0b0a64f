//! Dependency graph leveling and planning-time conflict detection.

use crate::fixtures::{graph_of, level_names, shell_task};
use foreman::core::graph::DependencyGraph;
use foreman::error::Error;

#[test]
fn diamond_produces_three_levels() {
    let (graph, _) = graph_of(&[
        ("a", &[]),
        ("b", &["a"]),
        ("c", &["a"]),
        ("d", &["b", "c"]),
    ]);

    assert_eq!(
        level_names(&graph),
        vec![
            vec!["a".to_string()],
            vec!["b".to_string(), "c".to_string()],
            vec!["d".to_string()],
        ]
    );
}

#[test]
fn every_dependency_lands_strictly_earlier() {
    let (graph, ids) = graph_of(&[
        ("root", &[]),
        ("mid1", &["root"]),
        ("mid2", &["root", "mid1"]),
        ("leaf", &["mid2"]),
        ("side", &[]),
    ]);

    let levels = graph.levels().unwrap();
    let level_of: std::collections::HashMap<_, _> = levels
        .iter()
        .flat_map(|l| l.tasks.iter().map(move |id| (*id, l.index)))
        .collect();

    for task in graph.all_tasks() {
        for dep in &task.dependencies {
            assert!(
                level_of[dep] < level_of[&task.id],
                "{} must run after its dependency",
                task.name
            );
        }
    }
    // "side" has no deps and goes as early as possible
    assert_eq!(level_of[&ids["side"]], 0);
}

#[test]
fn level_count_equals_longest_chain() {
    let (graph, _) = graph_of(&[
        ("c1", &[]),
        ("c2", &["c1"]),
        ("c3", &["c2"]),
        ("c4", &["c3"]),
        ("free", &[]),
    ]);

    assert_eq!(graph.levels().unwrap().len(), 4);
}

#[test]
fn empty_graph_has_zero_levels() {
    let graph = DependencyGraph::new();
    assert!(graph.levels().unwrap().is_empty());
}

#[test]
fn single_task_is_one_level_of_one() {
    let mut graph = DependencyGraph::new();
    graph.add_task(shell_task("only", "true"));

    let levels = graph.levels().unwrap();
    assert_eq!(levels.len(), 1);
    assert_eq!(levels[0].tasks.len(), 1);
}

#[test]
fn cycle_edge_is_rejected_and_graph_unchanged() {
    let (mut graph, ids) = graph_of(&[("a", &[]), ("b", &["a"])]);
    let edges_before = graph.dependency_count();

    let result = graph.add_dependency(&ids["b"], &ids["a"]);
    assert!(matches!(result, Err(Error::Cycle { .. })));
    assert_eq!(graph.dependency_count(), edges_before);

    // The graph still levels fine afterwards
    assert_eq!(graph.levels().unwrap().len(), 2);
}

#[test]
fn same_level_touch_overlap_is_a_planning_error() {
    let mut graph = DependencyGraph::new();
    graph.add_task(shell_task("writer1", "true").with_touch("src/shared.rs"));
    graph.add_task(shell_task("writer2", "true").with_touch("src/shared.rs"));

    let result = graph.levels();
    assert!(matches!(result, Err(Error::TouchConflict { .. })));
}

#[test]
fn touch_overlap_across_levels_is_fine() {
    let mut graph = DependencyGraph::new();
    let first = shell_task("first", "true").with_touch("src/shared.rs");
    let second = shell_task("second", "true").with_touch("src/shared.rs");
    let first_id = first.id;
    let second_id = second.id;
    graph.add_task(first);
    graph.add_task(second);
    graph.add_dependency(&first_id, &second_id).unwrap();

    let levels = graph.levels().unwrap();
    assert_eq!(levels.len(), 2);
}

#[test]
fn touch_conflict_error_is_classified_as_planning() {
    let mut graph = DependencyGraph::new();
    graph.add_task(shell_task("w1", "true").with_touch("f"));
    graph.add_task(shell_task("w2", "true").with_touch("f"));

    let err = graph.levels().unwrap_err();
    assert!(err.is_planning());
}
