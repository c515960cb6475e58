// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS resource sampling for worker processes.
//!
//! Samples cpu% and resident memory via `ps`, which is portable across
//! Linux and macOS. A failed sample returns `None` and the caller keeps
//! the previous reading.

use crate::subprocess::{run_with_timeout, PS_TIMEOUT};
use tokio::process::Command;

/// One resource sample for a process tree root.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

/// Sample cpu%/rss for `pid`. Returns `None` when the pid is gone or `ps`
/// output cannot be parsed.
pub async fn sample_pid(pid: u32) -> Option<ResourceSample> {
    let mut cmd = Command::new("ps");
    cmd.args(["-o", "%cpu=,rss=", "-p", &pid.to_string()]);
    let output = run_with_timeout(cmd, PS_TIMEOUT, "ps sample").await.ok()?;
    if !output.status.success() {
        return None;
    }
    parse_ps_line(&String::from_utf8_lossy(&output.stdout))
}

/// Parse one `ps -o %cpu=,rss=` line: cpu percent and rss in KiB.
fn parse_ps_line(line: &str) -> Option<ResourceSample> {
    let mut fields = line.split_whitespace();
    let cpu_percent: f64 = fields.next()?.parse().ok()?;
    let rss_kib: f64 = fields.next()?.parse().ok()?;
    Some(ResourceSample {
        cpu_percent,
        memory_mb: rss_kib / 1024.0,
    })
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
