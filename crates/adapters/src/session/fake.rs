// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake session adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{SessionAdapter, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Recorded session call
#[derive(Debug, Clone)]
pub enum SessionCall {
    Spawn {
        name: String,
        cwd: PathBuf,
        cmd: String,
        env: Vec<(String, String)>,
    },
    SendLiteral {
        id: String,
        text: String,
    },
    SendEnter {
        id: String,
    },
    Suspend {
        id: String,
    },
    Foreground {
        id: String,
    },
    Kill {
        id: String,
    },
    IsAlive {
        id: String,
    },
    CaptureOutput {
        id: String,
        lines: u32,
    },
}

/// Fake session state
#[derive(Debug, Clone)]
pub struct FakeSession {
    pub name: String,
    pub cwd: PathBuf,
    pub cmd: String,
    pub env: Vec<(String, String)>,
    pub output: Vec<String>,
    pub alive: bool,
    pub suspended: bool,
    pub exit_code: Option<i32>,
    pub pid: Option<u32>,
}

struct FakeSessionState {
    sessions: HashMap<String, FakeSession>,
    calls: Vec<SessionCall>,
    output_senders: HashMap<String, mpsc::Sender<String>>,
    pending_streams: HashMap<String, mpsc::Receiver<String>>,
    fail_next_spawn: Option<String>,
    next_id: u64,
}

/// Fake session adapter for testing
#[derive(Clone)]
pub struct FakeSessionAdapter {
    inner: Arc<Mutex<FakeSessionState>>,
}

impl Default for FakeSessionAdapter {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeSessionState {
                sessions: HashMap::new(),
                calls: Vec::new(),
                output_senders: HashMap::new(),
                pending_streams: HashMap::new(),
                fail_next_spawn: None,
                next_id: 0,
            })),
        }
    }
}

impl FakeSessionAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<SessionCall> {
        self.inner.lock().calls.clone()
    }

    /// Get a session by ID
    pub fn get_session(&self, id: &str) -> Option<FakeSession> {
        self.inner.lock().sessions.get(id).cloned()
    }

    /// Number of sessions ever spawned
    pub fn spawn_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SessionCall::Spawn { .. }))
            .count()
    }

    /// Make the next spawn fail with the given message
    pub fn fail_next_spawn(&self, message: impl Into<String>) {
        self.inner.lock().fail_next_spawn = Some(message.into());
    }

    /// Mark session as exited
    pub fn set_exited(&self, id: &str, exit_code: i32) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.sessions.get_mut(id) {
            session.alive = false;
            session.exit_code = Some(exit_code);
        }
        inner.output_senders.remove(id);
        inner.pending_streams.remove(id);
    }

    /// Push a line into the session's output (and its stream, if taken)
    pub fn push_output(&self, id: &str, line: impl Into<String>) {
        let line = line.into();
        let sender = {
            let mut inner = self.inner.lock();
            if let Some(session) = inner.sessions.get_mut(id) {
                session.output.push(line.clone());
            }
            inner.output_senders.get(id).cloned()
        };
        if let Some(tx) = sender {
            let _ = tx.try_send(line);
        }
    }
}

#[async_trait]
impl SessionAdapter for FakeSessionAdapter {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError> {
        let mut inner = self.inner.lock();

        inner.calls.push(SessionCall::Spawn {
            name: name.to_string(),
            cwd: cwd.to_path_buf(),
            cmd: cmd.to_string(),
            env: env.to_vec(),
        });

        if let Some(message) = inner.fail_next_spawn.take() {
            return Err(SessionError::SpawnFailed(message));
        }

        inner.next_id += 1;
        let id = format!("fake-{}", inner.next_id);
        let pid = 10_000 + inner.next_id as u32;

        inner.sessions.insert(
            id.clone(),
            FakeSession {
                name: name.to_string(),
                cwd: cwd.to_path_buf(),
                cmd: cmd.to_string(),
                env: env.to_vec(),
                output: Vec::new(),
                alive: true,
                suspended: false,
                exit_code: None,
                pid: Some(pid),
            },
        );

        let (tx, rx) = mpsc::channel(64);
        inner.output_senders.insert(id.clone(), tx);
        inner.pending_streams.insert(id.clone(), rx);

        Ok(id)
    }

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::SendLiteral {
            id: id.to_string(),
            text: text.to_string(),
        });
        if !inner.sessions.contains_key(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn send_enter(&self, id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push(SessionCall::SendEnter { id: id.to_string() });
        if !inner.sessions.contains_key(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn suspend(&self, id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push(SessionCall::Suspend { id: id.to_string() });
        match inner.sessions.get_mut(id) {
            Some(session) => {
                session.suspended = true;
                Ok(())
            }
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn foreground(&self, id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push(SessionCall::Foreground { id: id.to_string() });
        match inner.sessions.get_mut(id) {
            Some(session) => {
                session.suspended = false;
                Ok(())
            }
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::Kill { id: id.to_string() });
        if let Some(session) = inner.sessions.get_mut(id) {
            session.alive = false;
        }
        inner.output_senders.remove(id);
        Ok(())
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock();
        inner
            .calls
            .push(SessionCall::IsAlive { id: id.to_string() });
        match inner.sessions.get(id) {
            Some(session) => Ok(session.alive),
            None => Ok(false),
        }
    }

    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(SessionCall::CaptureOutput {
            id: id.to_string(),
            lines,
        });
        match inner.sessions.get(id) {
            Some(session) => {
                let start = session.output.len().saturating_sub(lines as usize);
                Ok(session.output[start..].join("\n"))
            }
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn pid(&self, id: &str) -> Result<Option<u32>, SessionError> {
        let inner = self.inner.lock();
        match inner.sessions.get(id) {
            Some(session) => Ok(session.pid),
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn exit_code(&self, id: &str) -> Result<Option<i32>, SessionError> {
        let inner = self.inner.lock();
        match inner.sessions.get(id) {
            Some(session) => Ok(session.exit_code),
            None => Ok(None),
        }
    }

    async fn take_output(&self, id: &str) -> Option<mpsc::Receiver<String>> {
        self.inner.lock().pending_streams.remove(id)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
