// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and state machine.

use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

crate::define_id! {
    /// Unique identifier for a task.
    ///
    /// Assigned by the orchestrator's ID generator at submission. Retrying a
    /// terminal task creates a new task under a new ID; IDs are never reused.
    #[derive(Default)]
    pub struct TaskId;
}

/// Kind of work a task represents, matched against worker types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    Research,
    Code,
    Test,
    Analysis,
    Swarm,
    HiveMind,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::Research,
        TaskType::Code,
        TaskType::Test,
        TaskType::Analysis,
        TaskType::Swarm,
        TaskType::HiveMind,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Research => "research",
            TaskType::Code => "code",
            TaskType::Test => "test",
            TaskType::Analysis => "analysis",
            TaskType::Swarm => "swarm",
            TaskType::HiveMind => "hive-mind",
        }
    }

    /// Parse the wire spelling (kebab-case).
    pub fn parse(s: &str) -> Option<TaskType> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies, capacity, or conflicts to clear
    Pending,
    /// Dispatched to a worker
    Running,
    /// Finished successfully (terminal)
    Completed,
    /// Finished unsuccessfully (terminal)
    Failed,
    /// A transitive dependency failed
    Blocked,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// Structured task parameters.
///
/// `files`, `ports`, and `services` are explicit resource claims merged with
/// whatever the conflict detector extracts from the description. Everything
/// else a client sends rides along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskParameters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TaskParameters {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.ports.is_empty()
            && self.services.is_empty()
            && self.extra.is_empty()
    }
}

/// Client-supplied fields for creating a task.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub task_type: TaskType,
    pub description: String,
    pub parameters: TaskParameters,
    pub priority: i64,
    /// Absolute deadline in epoch milliseconds
    pub deadline_ms: Option<u64>,
    pub dependencies: Vec<TaskId>,
}

impl TaskSpec {
    pub fn new(task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            task_type,
            description: description.into(),
            parameters: TaskParameters::default(),
            priority: 0,
            deadline_ms: None,
            dependencies: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn parameters(mut self, parameters: TaskParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A unit of work submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub description: String,
    #[serde(default, skip_serializing_if = "TaskParameters::is_empty")]
    pub parameters: TaskParameters,
    #[serde(default)]
    pub priority: i64,
    /// Absolute deadline, epoch milliseconds
    #[serde(default, rename = "deadline", skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<WorkerId>,
    /// Cached worker name for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker_name: Option<String>,
    /// Command handed to the worker, set at dispatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at_ms: u64,
    #[serde(rename = "updatedAt")]
    pub updated_at_ms: u64,
}

impl Task {
    pub fn new(id: TaskId, spec: TaskSpec, epoch_ms: u64) -> Self {
        Self {
            id,
            task_type: spec.task_type,
            description: spec.description,
            parameters: spec.parameters,
            priority: spec.priority,
            deadline_ms: spec.deadline_ms,
            dependencies: spec.dependencies,
            status: TaskStatus::Pending,
            assigned_worker: None,
            assigned_worker_name: None,
            rendered_command: None,
            error: None,
            created_at_ms: epoch_ms,
            updated_at_ms: epoch_ms,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record dispatch to a worker.
    pub fn mark_running(
        &mut self,
        worker: WorkerId,
        worker_name: impl Into<String>,
        command: impl Into<String>,
        epoch_ms: u64,
    ) {
        self.status = TaskStatus::Running;
        self.assigned_worker = Some(worker);
        self.assigned_worker_name = Some(worker_name.into());
        self.rendered_command = Some(command.into());
        self.error = None;
        self.updated_at_ms = epoch_ms;
    }

    pub fn mark_completed(&mut self, epoch_ms: u64) {
        self.status = TaskStatus::Completed;
        self.updated_at_ms = epoch_ms;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, epoch_ms: u64) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.updated_at_ms = epoch_ms;
    }

    pub fn mark_blocked(&mut self, epoch_ms: u64) {
        self.status = TaskStatus::Blocked;
        self.updated_at_ms = epoch_ms;
    }

    /// Return the task to the dispatch pool, clearing any assignment.
    pub fn mark_pending(&mut self, epoch_ms: u64) {
        self.status = TaskStatus::Pending;
        self.assigned_worker = None;
        self.assigned_worker_name = None;
        self.rendered_command = None;
        self.updated_at_ms = epoch_ms;
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
