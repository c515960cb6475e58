// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker record and state machine.

use crate::ring::OutputRing;
use crate::task::{TaskId, TaskType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

crate::define_id! {
    /// Unique identifier for a worker instance.
    #[derive(Default)]
    pub struct WorkerId;
}

/// Lifecycle status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Process/session is being created
    Spawning,
    /// Alive and able to take work
    Running,
    /// Suspended; resumable
    Paused,
    /// Shut down cleanly (terminal)
    Stopped,
    /// Died or failed to start (terminal)
    Error,
}

impl WorkerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Stopped | WorkerStatus::Error)
    }

    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Spawning => write!(f, "spawning"),
            WorkerStatus::Running => write!(f, "running"),
            WorkerStatus::Paused => write!(f, "paused"),
            WorkerStatus::Stopped => write!(f, "stopped"),
            WorkerStatus::Error => write!(f, "error"),
        }
    }
}

/// How the worker is attached to the system: a terminal-multiplexer session
/// or a raw child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    Multiplexer { session: String },
    Process { pid: u32 },
}

impl Attachment {
    pub fn session_name(&self) -> Option<&str> {
        match self {
            Attachment::Multiplexer { session } => Some(session),
            Attachment::Process { .. } => None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            Attachment::Multiplexer { .. } => None,
            Attachment::Process { pid } => Some(*pid),
        }
    }
}

/// Latest resource sample for a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Percent of one core
    #[serde(rename = "cpu")]
    pub cpu_percent: f64,
    /// Resident memory in MB
    #[serde(rename = "memory")]
    pub memory_mb: f64,
}

/// A supervised external process executing tasks of a matching type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: WorkerId,
    /// Human-oriented name, unique case-insensitively among live workers
    pub descriptive_name: String,
    /// Optional single-digit UI shortcut, unique among live workers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_access_key: Option<u8>,
    #[serde(rename = "type")]
    pub worker_type: TaskType,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub capabilities: BTreeSet<String>,
    pub status: WorkerStatus,
    pub attachment: Attachment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<TaskId>,
    #[serde(default)]
    pub resources: ResourceUsage,
    /// Recent stdout/stderr window; older lines are evicted
    #[serde(default)]
    pub output: OutputRing,
    #[serde(rename = "startedAt")]
    pub started_at_ms: u64,
    #[serde(rename = "lastActive")]
    pub last_active_ms: u64,
}

impl Worker {
    /// A worker can take a task when it is running with no current task.
    pub fn is_idle(&self) -> bool {
        self.status == WorkerStatus::Running && self.current_task.is_none()
    }

    /// Type matches and declared capabilities cover the required set.
    pub fn can_service(&self, task_type: TaskType, required: &BTreeSet<String>) -> bool {
        self.worker_type == task_type && required.is_subset(&self.capabilities)
    }

    pub fn touch(&mut self, epoch_ms: u64) {
        self.last_active_ms = epoch_ms;
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
