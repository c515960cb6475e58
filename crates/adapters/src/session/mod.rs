// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session management adapters.
//!
//! A session is the execution surface behind one worker: a terminal
//! multiplexer pane ([`TmuxAdapter`]) or a raw child process
//! ([`crate::ProcessAdapter`]). Both speak the same [`SessionAdapter`]
//! trait so the worker manager does not care which it got.

mod tmux;

pub use tmux::TmuxAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSession, FakeSessionAdapter, SessionCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Adapter for managing worker execution surfaces.
#[async_trait]
pub trait SessionAdapter: Clone + Send + Sync + 'static {
    /// Spawn a new session running `cmd` in `cwd`, returning its session id.
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError>;

    /// Send literal text to a session (no key interpretation)
    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError>;

    /// Submit the pending input (Enter key or newline)
    async fn send_enter(&self, id: &str) -> Result<(), SessionError>;

    /// Suspend the session's foreground process
    async fn suspend(&self, id: &str) -> Result<(), SessionError>;

    /// Bring a suspended session back to the foreground
    async fn foreground(&self, id: &str) -> Result<(), SessionError>;

    /// Kill a session
    async fn kill(&self, id: &str) -> Result<(), SessionError>;

    /// Check if a session is alive
    async fn is_alive(&self, id: &str) -> Result<bool, SessionError>;

    /// Capture recent output from a session
    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError>;

    /// PID of the session's top-level process, for signals and metrics
    async fn pid(&self, id: &str) -> Result<Option<u32>, SessionError>;

    /// Exit code of the session's process, `None` while still running
    async fn exit_code(&self, id: &str) -> Result<Option<i32>, SessionError>;

    /// Take the session's live output stream, if this adapter captures one.
    ///
    /// Process-backed sessions stream captured lines; multiplexer panes
    /// return `None` and are polled via [`SessionAdapter::capture_output`].
    async fn take_output(&self, _id: &str) -> Option<mpsc::Receiver<String>> {
        None
    }
}
