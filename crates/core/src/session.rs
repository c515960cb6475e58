// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted session shapes.

use crate::task::Task;
use crate::worker::Worker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot format version. Mismatches are rejected, never migrated silently.
pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// The full state of one orchestrator session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SessionData {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            start_time: now,
            last_update: now,
            tasks: Vec::new(),
            workers: Vec::new(),
            metadata: Map::new(),
        }
    }
}

/// Versioned on-disk envelope around [`SessionData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub session: SessionData,
}

impl SessionSnapshot {
    pub fn new(session: SessionData) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            timestamp: Utc::now(),
            session,
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
