// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency-aware task graph.
//!
//! Holds every task of the session in insertion order and guards the
//! dependency edges against cycles. Edges to unknown predecessors are legal;
//! the task simply stays unexecutable until those ids show up and complete.

use gaffer_core::{Task, TaskId, TaskStatus};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from graph mutations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("dependency cycle through task {0}")]
    CycleDetected(TaskId),
    #[error("task not found: {0}")]
    NotFound(TaskId),
}

/// Per-status task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub blocked: usize,
}

/// The session's task DAG.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: IndexMap<TaskId, Task>,
    /// Reverse edges: dependents[b] = tasks that declared a dependency on b
    dependents: HashMap<TaskId, IndexSet<TaskId>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// All tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Insert a task with its declared dependency edges.
    ///
    /// Re-inserting an existing id overwrites the record in place (keeping
    /// its position and its dependents). Fails without inserting when any
    /// declared edge would close a cycle.
    pub fn add_task(&mut self, task: Task) -> Result<(), GraphError> {
        for dep in &task.dependencies {
            if *dep == task.id || self.reaches(dep, &task.id) {
                return Err(GraphError::CycleDetected(task.id.clone()));
            }
        }

        // Detach reverse edges of a replaced record before re-adding
        if let Some(old) = self.tasks.get(&task.id) {
            let old_deps = old.dependencies.clone();
            for dep in old_deps {
                if let Some(set) = self.dependents.get_mut(&dep) {
                    set.shift_remove(&task.id);
                }
            }
        }

        for dep in &task.dependencies {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(task.id.clone());
        }
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Record "a depends on b". `b` may be unknown; `a` must exist.
    pub fn add_dependency(&mut self, a: &TaskId, b: &TaskId) -> Result<(), GraphError> {
        if !self.tasks.contains_key(a) {
            return Err(GraphError::NotFound(a.clone()));
        }
        if a == b || self.reaches(b, a) {
            return Err(GraphError::CycleDetected(a.clone()));
        }

        let task = self
            .tasks
            .get_mut(a)
            .ok_or_else(|| GraphError::NotFound(a.clone()))?;
        if !task.dependencies.contains(b) {
            task.dependencies.push(b.clone());
        }
        self.dependents
            .entry(b.clone())
            .or_default()
            .insert(a.clone());
        Ok(())
    }

    /// Remove a task, detaching edges in both directions.
    pub fn remove_task(&mut self, id: &TaskId) -> Option<Task> {
        let task = self.tasks.shift_remove(id)?;
        for dep in &task.dependencies {
            if let Some(set) = self.dependents.get_mut(dep) {
                set.shift_remove(id);
            }
        }
        if let Some(dependents) = self.dependents.remove(id) {
            for dependent in dependents {
                if let Some(t) = self.tasks.get_mut(&dependent) {
                    t.dependencies.retain(|d| d != id);
                }
            }
        }
        Some(task)
    }

    /// All pending tasks whose every dependency is completed, sorted by
    /// priority descending. Ties keep insertion order (stable sort).
    pub fn executable_tasks(&self) -> Vec<&Task> {
        let mut ready: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending && self.dependencies_met(t))
            .collect();
        ready.sort_by_key(|t| std::cmp::Reverse(t.priority));
        ready
    }

    fn dependencies_met(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|dep| {
            self.tasks
                .get(dep)
                .map(|d| d.status == TaskStatus::Completed)
                .unwrap_or(false)
        })
    }

    pub fn mark_completed(&mut self, id: &TaskId, epoch_ms: u64) -> Result<(), GraphError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        task.mark_completed(epoch_ms);
        Ok(())
    }

    /// Fail a task and cascade `blocked` onto every transitively pending
    /// dependent. Returns the ids that became blocked.
    pub fn mark_failed(
        &mut self,
        id: &TaskId,
        error: Option<String>,
        epoch_ms: u64,
    ) -> Result<Vec<TaskId>, GraphError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| GraphError::NotFound(id.clone()))?;
        task.mark_failed(error.unwrap_or_else(|| "task failed".to_string()), epoch_ms);

        let mut blocked = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            let Some(dependents) = self.dependents.get(&current) else {
                continue;
            };
            let dependents: Vec<TaskId> = dependents.iter().cloned().collect();
            for dependent in dependents {
                if let Some(t) = self.tasks.get_mut(&dependent) {
                    if t.status == TaskStatus::Pending {
                        t.mark_blocked(epoch_ms);
                        blocked.push(dependent.clone());
                        stack.push(dependent);
                    }
                }
            }
        }
        Ok(blocked)
    }

    /// Re-check blocked tasks; any with no failed transitive dependency
    /// returns to pending. Run every tick. Returns the ids that unblocked.
    pub fn revisit_blocked(&mut self, epoch_ms: u64) -> Vec<TaskId> {
        let blocked: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Blocked)
            .map(|t| t.id.clone())
            .collect();

        let mut unblocked = Vec::new();
        for id in blocked {
            if !self.has_failed_transitive_dep(&id) {
                if let Some(task) = self.tasks.get_mut(&id) {
                    task.mark_pending(epoch_ms);
                    unblocked.push(id);
                }
            }
        }
        unblocked
    }

    fn has_failed_transitive_dep(&self, id: &TaskId) -> bool {
        let mut visited: IndexSet<TaskId> = IndexSet::new();
        let mut stack: Vec<TaskId> = self
            .tasks
            .get(id)
            .map(|t| t.dependencies.clone())
            .unwrap_or_default();

        while let Some(dep) = stack.pop() {
            if !visited.insert(dep.clone()) {
                continue;
            }
            if let Some(task) = self.tasks.get(&dep) {
                if task.status == TaskStatus::Failed {
                    return true;
                }
                stack.extend(task.dependencies.iter().cloned());
            }
        }
        false
    }

    /// True if `target` is reachable from `from` along dependency edges.
    /// DFS with an explicit stack; unknown ids are dead ends.
    fn reaches(&self, from: &TaskId, target: &TaskId) -> bool {
        if from == target {
            return true;
        }
        let mut visited: IndexSet<TaskId> = IndexSet::new();
        let mut stack = vec![from.clone()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(task) = self.tasks.get(&current) {
                for dep in &task.dependencies {
                    if dep == target {
                        return true;
                    }
                    stack.push(dep.clone());
                }
            }
        }
        false
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Blocked => counts.blocked += 1,
            }
        }
        counts
    }

    /// Snapshot of the dependency edges, insertion-ordered.
    pub fn adjacency(&self) -> Vec<(TaskId, Vec<TaskId>)> {
        self.tasks
            .values()
            .map(|t| (t.id.clone(), t.dependencies.clone()))
            .collect()
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
