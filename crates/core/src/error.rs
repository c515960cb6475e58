// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable machine-readable failure tags.
//!
//! Domain errors never cross the RPC boundary as free-form strings; each
//! carries one of these kinds, serialized into the error `data.kind` field.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Adding the task or edge would create a dependency cycle
    Cycle,
    /// A worker or concurrency cap is exhausted
    Cap,
    /// An error-severity resource conflict
    Conflict,
    NotFound,
    /// The target exists but cannot service the request right now
    Busy,
    /// Worker creation exceeded its timeout
    SpawnTimeout,
    /// A running task outlived its deadline
    Deadline,
    /// Rendering or delivering the command failed
    Dispatch,
    /// Snapshot version gate rejected the state file
    UnsupportedVersion,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Cycle => "Cycle",
            ErrorKind::Cap => "Cap",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Busy => "Busy",
            ErrorKind::SpawnTimeout => "SpawnTimeout",
            ErrorKind::Deadline => "Deadline",
            ErrorKind::Dispatch => "Dispatch",
            ErrorKind::UnsupportedVersion => "UnsupportedVersion",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
