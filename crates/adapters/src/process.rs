// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw child-process sessions.
//!
//! Fallback execution surface when no terminal multiplexer is installed.
//! Each session is a detached `sh -c <cmd>` child with piped stdio; captured
//! lines feed both a bounded recent-output buffer and a take-once stream.

use crate::session::{SessionAdapter, SessionError};
use crate::subprocess::{run_with_timeout, SIGNAL_TIMEOUT};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;

/// Lines of recent output retained per process for `capture_output`.
const MAX_RECENT_LINES: usize = 1000;

#[derive(Default)]
struct ProcessState {
    entries: HashMap<String, ProcEntry>,
    pending_streams: HashMap<String, mpsc::Receiver<String>>,
}

struct ProcEntry {
    pid: u32,
    stdin: Option<Arc<tokio::sync::Mutex<ChildStdin>>>,
    recent: Vec<String>,
    alive: bool,
    exit_code: Option<i32>,
}

/// Child-process session adapter
#[derive(Clone, Default)]
pub struct ProcessAdapter {
    state: Arc<Mutex<ProcessState>>,
}

impl ProcessAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn stdin_for(&self, id: &str) -> Result<Arc<tokio::sync::Mutex<ChildStdin>>, SessionError> {
        let state = self.state.lock();
        let entry = state
            .entries
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        entry
            .stdin
            .clone()
            .ok_or_else(|| SessionError::CommandFailed(format!("stdin closed for {id}")))
    }

    fn pid_for(&self, id: &str) -> Result<u32, SessionError> {
        let state = self.state.lock();
        state
            .entries
            .get(id)
            .map(|e| e.pid)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    async fn signal(&self, id: &str, sig: &str) -> Result<(), SessionError> {
        let pid = self.pid_for(id)?;
        signal_pid(pid, sig).await
    }
}

/// Deliver a signal to a pid by shelling out to `kill`.
///
/// Also used as the pause/resume fallback when a multiplexer lacks a
/// trusted suspend sequence.
pub async fn signal_pid(pid: u32, sig: &str) -> Result<(), SessionError> {
    let mut cmd = Command::new("kill");
    cmd.args([sig, &pid.to_string()]);
    let output = run_with_timeout(cmd, SIGNAL_TIMEOUT, "kill")
        .await
        .map_err(SessionError::CommandFailed)?;
    if !output.status.success() {
        return Err(SessionError::CommandFailed(format!(
            "kill {sig} {pid}: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

fn spawn_line_reader<R>(
    reader: R,
    id: String,
    state: Arc<Mutex<ProcessState>>,
    tx: mpsc::Sender<String>,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            {
                let mut state = state.lock();
                if let Some(entry) = state.entries.get_mut(&id) {
                    if entry.recent.len() == MAX_RECENT_LINES {
                        entry.recent.remove(0);
                    }
                    entry.recent.push(line.clone());
                }
            }
            // Stream is best-effort; a full or missing receiver drops the line
            let _ = tx.try_send(line);
        }
    });
}

#[async_trait]
impl SessionAdapter for ProcessAdapter {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError> {
        if !cwd.exists() {
            return Err(SessionError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| SessionError::SpawnFailed("child has no pid".to_string()))?;
        let id = format!("proc-{pid}");

        tracing::debug!(id, name, pid, "spawned process session");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel(256);
        {
            let mut state = self.state.lock();
            state.entries.insert(
                id.clone(),
                ProcEntry {
                    pid,
                    stdin: stdin.map(|s| Arc::new(tokio::sync::Mutex::new(s))),
                    recent: Vec::new(),
                    alive: true,
                    exit_code: None,
                },
            );
            state.pending_streams.insert(id.clone(), rx);
        }

        if let Some(stdout) = stdout {
            spawn_line_reader(stdout, id.clone(), Arc::clone(&self.state), tx.clone());
        }
        if let Some(stderr) = stderr {
            spawn_line_reader(stderr, id.clone(), Arc::clone(&self.state), tx);
        }

        // Waiter task records the exit and releases the child
        let state = Arc::clone(&self.state);
        let waiter_id = id.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(id = waiter_id, error = %e, "wait failed");
                    None
                }
            };
            let mut state = state.lock();
            if let Some(entry) = state.entries.get_mut(&waiter_id) {
                entry.alive = false;
                // Killed-by-signal has no code; report the conventional -1
                entry.exit_code = Some(code.unwrap_or(-1));
                entry.stdin = None;
            }
        });

        Ok(id)
    }

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError> {
        let stdin = self.stdin_for(id)?;
        let mut stdin = stdin.lock().await;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))
    }

    async fn send_enter(&self, id: &str) -> Result<(), SessionError> {
        let stdin = self.stdin_for(id)?;
        let mut stdin = stdin.lock().await;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))
    }

    async fn suspend(&self, id: &str) -> Result<(), SessionError> {
        self.signal(id, "-STOP").await
    }

    async fn foreground(&self, id: &str) -> Result<(), SessionError> {
        self.signal(id, "-CONT").await
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        // Already-dead sessions are fine to kill again
        match self.signal(id, "-TERM").await {
            Ok(()) | Err(SessionError::CommandFailed(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        let state = self.state.lock();
        Ok(state.entries.get(id).map(|e| e.alive).unwrap_or(false))
    }

    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError> {
        let state = self.state.lock();
        let entry = state
            .entries
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let start = entry.recent.len().saturating_sub(lines as usize);
        Ok(entry.recent[start..].join("\n"))
    }

    async fn pid(&self, id: &str) -> Result<Option<u32>, SessionError> {
        Ok(Some(self.pid_for(id)?))
    }

    async fn exit_code(&self, id: &str) -> Result<Option<i32>, SessionError> {
        let state = self.state.lock();
        match state.entries.get(id) {
            Some(entry) => Ok(entry.exit_code),
            None => Ok(None),
        }
    }

    async fn take_output(&self, id: &str) -> Option<mpsc::Receiver<String>> {
        self.state.lock().pending_streams.remove(id)
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
