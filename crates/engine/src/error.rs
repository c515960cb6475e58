// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the orchestrator

use crate::conflict::Conflict;
use crate::graph::GraphError;
use gaffer_core::{ErrorKind, TaskId};
use gaffer_storage::StateError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("dependency cycle through task {0}")]
    Cycle(TaskId),
    #[error("worker capacity exceeded: {live} live workers (max {max})")]
    CapacityExceeded { live: usize, max: usize },
    #[error("conflict: {}", summarize(.0))]
    Conflict(Vec<Conflict>),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("busy: {0}")]
    Busy(String),
    #[error("worker spawn timed out after {0:?}")]
    SpawnTimeout(Duration),
    #[error("deadline expired for task {0}")]
    Deadline(TaskId),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error(transparent)]
    State(#[from] StateError),
}

impl OrchestratorError {
    /// Stable wire tag for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Cycle(_) => ErrorKind::Cycle,
            OrchestratorError::CapacityExceeded { .. } => ErrorKind::Cap,
            OrchestratorError::Conflict(_) => ErrorKind::Conflict,
            OrchestratorError::NotFound(_) => ErrorKind::NotFound,
            OrchestratorError::Busy(_) => ErrorKind::Busy,
            OrchestratorError::SpawnTimeout(_) => ErrorKind::SpawnTimeout,
            OrchestratorError::Deadline(_) => ErrorKind::Deadline,
            OrchestratorError::Dispatch(_) => ErrorKind::Dispatch,
            OrchestratorError::State(StateError::UnsupportedVersion { .. }) => {
                ErrorKind::UnsupportedVersion
            }
            OrchestratorError::State(_) => ErrorKind::Dispatch,
        }
    }
}

impl From<GraphError> for OrchestratorError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::CycleDetected(id) => OrchestratorError::Cycle(id),
            GraphError::NotFound(id) => OrchestratorError::NotFound(id.to_string()),
        }
    }
}

fn summarize(conflicts: &[Conflict]) -> String {
    match conflicts.first() {
        Some(first) if conflicts.len() == 1 => first.description.clone(),
        Some(first) => format!("{} (+{} more)", first.description, conflicts.len() - 1),
        None => "no conflicts".to_string(),
    }
}
