// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gaffer_core::{TaskSpec, TaskType};
use proptest::prelude::*;

fn task(id: &str, deps: &[&str]) -> Task {
    let mut spec = TaskSpec::new(TaskType::Code, format!("work on {id}"));
    for dep in deps {
        spec = spec.depends_on(*dep);
    }
    Task::new(TaskId::new(id), spec, 1)
}

fn task_with_priority(id: &str, priority: i64) -> Task {
    Task::new(
        TaskId::new(id),
        TaskSpec::new(TaskType::Code, "x").priority(priority),
        1,
    )
}

#[test]
fn self_dependency_is_a_cycle() {
    let mut graph = TaskGraph::new();
    let err = graph.add_task(task("a", &["a"])).unwrap_err();
    assert_eq!(err, GraphError::CycleDetected(TaskId::new("a")));
    assert!(graph.is_empty());
}

#[test]
fn two_task_cycle_rejected_second_submission() {
    let mut graph = TaskGraph::new();
    graph.add_task(task("a", &["b"])).unwrap();

    // b depends on a would close the loop
    let err = graph.add_task(task("b", &["a"])).unwrap_err();
    assert_eq!(err, GraphError::CycleDetected(TaskId::new("b")));

    // graph contains only a
    assert_eq!(graph.len(), 1);
    assert!(graph.contains(&TaskId::new("a")));
}

#[test]
fn transitive_cycle_rejected() {
    let mut graph = TaskGraph::new();
    graph.add_task(task("a", &[])).unwrap();
    graph.add_task(task("b", &["a"])).unwrap();
    graph.add_task(task("c", &["b"])).unwrap();

    let err = graph
        .add_dependency(&TaskId::new("a"), &TaskId::new("c"))
        .unwrap_err();
    assert_eq!(err, GraphError::CycleDetected(TaskId::new("a")));
}

#[test]
fn add_dependency_requires_existing_dependent() {
    let mut graph = TaskGraph::new();
    let err = graph
        .add_dependency(&TaskId::new("ghost"), &TaskId::new("b"))
        .unwrap_err();
    assert_eq!(err, GraphError::NotFound(TaskId::new("ghost")));
}

#[test]
fn unknown_predecessor_keeps_task_unexecutable() {
    let mut graph = TaskGraph::new();
    graph.add_task(task("a", &["missing"])).unwrap();
    assert!(graph.executable_tasks().is_empty());

    // Once the predecessor appears and completes, a becomes executable
    graph.add_task(task("missing", &[])).unwrap();
    graph
        .mark_completed(&TaskId::new("missing"), 2)
        .unwrap();
    let ready: Vec<_> = graph.executable_tasks().iter().map(|t| t.id.clone()).collect();
    assert_eq!(ready, vec![TaskId::new("a")]);
}

#[test]
fn executable_sorted_by_priority_then_insertion() {
    let mut graph = TaskGraph::new();
    graph.add_task(task_with_priority("low", 1)).unwrap();
    graph.add_task(task_with_priority("first-high", 5)).unwrap();
    graph.add_task(task_with_priority("second-high", 5)).unwrap();

    let order: Vec<_> = graph
        .executable_tasks()
        .iter()
        .map(|t| t.id.as_str().to_string())
        .collect();
    assert_eq!(order, vec!["first-high", "second-high", "low"]);
}

#[test]
fn dependents_blocked_when_dependency_fails() {
    let mut graph = TaskGraph::new();
    graph.add_task(task("a", &[])).unwrap();
    graph.add_task(task("b", &["a"])).unwrap();
    graph.add_task(task("c", &["b"])).unwrap();
    graph.add_task(task("free", &[])).unwrap();

    let blocked = graph
        .mark_failed(&TaskId::new("a"), Some("boom".to_string()), 2)
        .unwrap();
    assert_eq!(blocked, vec![TaskId::new("b"), TaskId::new("c")]);

    assert_eq!(graph.get(&TaskId::new("b")).unwrap().status, TaskStatus::Blocked);
    assert_eq!(graph.get(&TaskId::new("c")).unwrap().status, TaskStatus::Blocked);
    assert_eq!(graph.get(&TaskId::new("free")).unwrap().status, TaskStatus::Pending);

    let counts = graph.counts();
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.blocked, 2);
    assert_eq!(counts.pending, 1);
}

#[test]
fn blocked_task_unblocks_when_dependency_recovers() {
    let mut graph = TaskGraph::new();
    graph.add_task(task("a", &[])).unwrap();
    graph.add_task(task("b", &["a"])).unwrap();
    graph
        .mark_failed(&TaskId::new("a"), None, 2)
        .unwrap();
    assert_eq!(graph.get(&TaskId::new("b")).unwrap().status, TaskStatus::Blocked);

    // Nothing recovers while the dependency is still failed
    assert!(graph.revisit_blocked(3).is_empty());

    // Replace a (retry under the same id) and complete it
    graph.add_task(task("a", &[])).unwrap();
    graph.mark_completed(&TaskId::new("a"), 4).unwrap();

    let unblocked = graph.revisit_blocked(5);
    assert_eq!(unblocked, vec![TaskId::new("b")]);
    assert_eq!(graph.get(&TaskId::new("b")).unwrap().status, TaskStatus::Pending);
}

#[test]
fn reinsert_preserves_position_and_dependents() {
    let mut graph = TaskGraph::new();
    graph.add_task(task_with_priority("a", 5)).unwrap();
    graph.add_task(task_with_priority("b", 5)).unwrap();
    graph.add_task(task("child", &["a"])).unwrap();

    // Overwrite a with new fields
    let replacement = Task::new(
        TaskId::new("a"),
        TaskSpec::new(TaskType::Test, "rewritten").priority(5),
        9,
    );
    graph.add_task(replacement).unwrap();

    // Insertion order tie-break still puts a before b
    let order: Vec<_> = graph
        .executable_tasks()
        .iter()
        .map(|t| t.id.as_str().to_string())
        .collect();
    assert_eq!(order, vec!["a", "b"]);

    // child still depends on a: fail a, child blocks
    let blocked = graph.mark_failed(&TaskId::new("a"), None, 10).unwrap();
    assert_eq!(blocked, vec![TaskId::new("child")]);
}

#[test]
fn remove_task_detaches_both_directions() {
    let mut graph = TaskGraph::new();
    graph.add_task(task("a", &[])).unwrap();
    graph.add_task(task("b", &["a"])).unwrap();

    graph.remove_task(&TaskId::new("a")).unwrap();
    assert!(graph.get(&TaskId::new("b")).unwrap().dependencies.is_empty());

    // b is now executable (no deps left)
    let ready: Vec<_> = graph.executable_tasks().iter().map(|t| t.id.clone()).collect();
    assert_eq!(ready, vec![TaskId::new("b")]);
}

#[test]
fn adjacency_snapshot_reports_edges() {
    let mut graph = TaskGraph::new();
    graph.add_task(task("a", &[])).unwrap();
    graph.add_task(task("b", &["a"])).unwrap();

    let adjacency = graph.adjacency();
    assert_eq!(adjacency.len(), 2);
    assert_eq!(adjacency[1].0, TaskId::new("b"));
    assert_eq!(adjacency[1].1, vec![TaskId::new("a")]);
}

proptest! {
    /// Arbitrary interleavings of add_task/add_dependency never leave a cycle.
    #[test]
    fn graph_stays_acyclic(edges in proptest::collection::vec((0usize..8, 0usize..8), 0..40)) {
        let mut graph = TaskGraph::new();
        for i in 0..8 {
            let _ = graph.add_task(task(&format!("t{i}"), &[]));
        }
        for (a, b) in edges {
            let _ = graph.add_dependency(
                &TaskId::new(format!("t{a}")),
                &TaskId::new(format!("t{b}")),
            );
        }

        // Walk every path; no task may reach itself
        for (id, _) in graph.adjacency() {
            let mut visited = std::collections::HashSet::new();
            let mut stack: Vec<TaskId> = graph.get(&id).unwrap().dependencies.clone();
            while let Some(dep) = stack.pop() {
                prop_assert_ne!(&dep, &id, "cycle through {}", id);
                if visited.insert(dep.clone()) {
                    if let Some(t) = graph.get(&dep) {
                        stack.extend(t.dependencies.iter().cloned());
                    }
                }
            }
        }
    }
}
