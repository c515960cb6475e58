// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded ring buffer for worker output.
//!
//! Workers can produce unbounded terminal output; only the most recent
//! window is kept. Clients that want more history than the window receive
//! only the window.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::VecDeque;

/// Default number of retained output lines per worker.
pub const DEFAULT_OUTPUT_LINES: usize = 1000;

/// Fixed-capacity line buffer; pushing past capacity evicts the oldest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRing {
    capacity: usize,
    lines: VecDeque<String>,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Append a line, evicting the oldest when at capacity.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// The retained window, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// The last `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<&str> {
        let start = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(start).map(String::as_str).collect()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Default for OutputRing {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_LINES)
    }
}

// Persisted as a plain array of lines; capacity is a runtime concern and
// rehydrates to the default.
impl Serialize for OutputRing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.lines.iter())
    }
}

impl<'de> Deserialize<'de> for OutputRing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let lines = Vec::<String>::deserialize(deserializer)?;
        let mut ring = OutputRing::default();
        for line in lines {
            ring.push(line);
        }
        Ok(ring)
    }
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
