// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types broadcast by the orchestrator.
//!
//! A closed sum replaces string event names and untyped payloads: every
//! mutation the outside world can observe is one of these variants. The RPC
//! hub translates them into wire notifications using [`Event::name`] as the
//! method.

use crate::session::SessionData;
use crate::task::{Task, TaskId};
use crate::worker::{Worker, WorkerId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events emitted on orchestrator state transitions.
///
/// Serializes with `{"type": "task.update", ...fields}` format.
/// Unknown type tags deserialize to `Custom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A task changed status or assignment; carries the full record.
    #[serde(rename = "task.update")]
    TaskUpdate { task: Task },

    #[serde(rename = "task.completed")]
    TaskCompleted { task_id: TaskId },

    #[serde(rename = "task.failed")]
    TaskFailed { task_id: TaskId, error: String },

    /// A worker changed status, assignment, or resources.
    #[serde(rename = "worker.update")]
    WorkerUpdate { worker: Worker },

    /// One captured output line from a worker's session.
    #[serde(rename = "worker.output")]
    WorkerOutput { worker_id: WorkerId, line: String },

    #[serde(rename = "worker.stopped")]
    WorkerStopped { worker_id: WorkerId },

    /// Session snapshot written to disk.
    #[serde(rename = "state.saved")]
    StateSaved { path: PathBuf },

    /// Snapshot write failed; the next autosave retries.
    #[serde(rename = "state.saveError")]
    SaveError { message: String },

    /// Full session pushed to a client on connect.
    #[serde(rename = "initialState")]
    InitialState { session: SessionData },

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskUpdate { .. } => "task.update",
            Event::TaskCompleted { .. } => "task.completed",
            Event::TaskFailed { .. } => "task.failed",
            Event::WorkerUpdate { .. } => "worker.update",
            Event::WorkerOutput { .. } => "worker.output",
            Event::WorkerStopped { .. } => "worker.stopped",
            Event::StateSaved { .. } => "state.saved",
            Event::SaveError { .. } => "state.saveError",
            Event::InitialState { .. } => "initialState",
            Event::Custom => "custom",
        }
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::TaskUpdate { task } => {
                format!("{t} id={} status={}", task.id, task.status)
            }
            Event::TaskCompleted { task_id } => format!("{t} id={task_id}"),
            Event::TaskFailed { task_id, error } => format!("{t} id={task_id} error={error}"),
            Event::WorkerUpdate { worker } => {
                format!("{t} id={} status={}", worker.id, worker.status)
            }
            Event::WorkerOutput { worker_id, .. } => format!("{t} worker={worker_id}"),
            Event::WorkerStopped { worker_id } => format!("{t} worker={worker_id}"),
            Event::StateSaved { path } => format!("{t} path={}", path.display()),
            Event::SaveError { message } => format!("{t} message={message}"),
            Event::InitialState { session } => format!(
                "{t} tasks={} workers={}",
                session.tasks.len(),
                session.workers.len()
            ),
            Event::Custom => t.to_string(),
        }
    }

    /// Extract the task id if this is a task-scoped event.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskUpdate { task } => Some(&task.id),
            Event::TaskCompleted { task_id } | Event::TaskFailed { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
