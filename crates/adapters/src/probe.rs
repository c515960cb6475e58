// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal-multiplexer capability probe.
//!
//! Run once at startup: decides whether workers attach as multiplexer
//! sessions or raw child processes, and whether the suspend/foreground key
//! sequence is trusted on this platform.

use crate::subprocess::{run_with_timeout, TMUX_TIMEOUT};
use tokio::process::Command;

/// What the probe found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub available: bool,
    pub version: Option<String>,
    /// Whether the C-z/fg pause sequence is known to work here.
    /// When false, pause falls back to process signals against the pane pid.
    pub pause_capable: bool,
}

impl ProbeReport {
    /// Report for a host without a multiplexer.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            version: None,
            pause_capable: false,
        }
    }
}

/// Probe for tmux on this host.
pub async fn probe_multiplexer() -> ProbeReport {
    let mut cmd = Command::new("tmux");
    cmd.arg("-V");
    let output = match run_with_timeout(cmd, TMUX_TIMEOUT, "tmux probe").await {
        Ok(output) if output.status.success() => output,
        _ => return ProbeReport::unavailable(),
    };

    let version = parse_version(&String::from_utf8_lossy(&output.stdout));
    ProbeReport {
        available: true,
        // The key sequence is exercised on every platform tmux itself
        // supports; unknown multiplexers would report false here.
        pause_capable: true,
        version,
    }
}

/// Parse `tmux 3.4` → `3.4`.
fn parse_version(s: &str) -> Option<String> {
    let rest = s.trim().strip_prefix("tmux ")?;
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
