// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime selection of the worker execution surface.
//!
//! The startup probe decides once whether workers live in multiplexer
//! sessions or raw child processes; [`AnySession`] erases the choice so the
//! rest of the daemon is monomorphic over a single adapter type.

use async_trait::async_trait;
use gaffer_adapters::probe::probe_multiplexer;
use gaffer_adapters::session::{SessionAdapter, SessionError};
use gaffer_adapters::{ProcessAdapter, TmuxAdapter};
use gaffer_engine::AttachmentMode;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::info;

/// Either execution surface, chosen at startup.
#[derive(Clone)]
pub enum AnySession {
    Tmux(TmuxAdapter),
    Process(ProcessAdapter),
}

/// Probe the host and pick the attachment mode.
pub async fn detect() -> (AnySession, AttachmentMode) {
    let report = probe_multiplexer().await;
    if report.available {
        info!(version = ?report.version, "multiplexer available, using tmux sessions");
        (
            AnySession::Tmux(TmuxAdapter::new()),
            AttachmentMode::Multiplexer {
                pause_capable: report.pause_capable,
            },
        )
    } else {
        info!("no multiplexer found, using raw child processes");
        (
            AnySession::Process(ProcessAdapter::new()),
            AttachmentMode::Process,
        )
    }
}

macro_rules! delegate {
    ($self:ident, $adapter:ident => $call:expr) => {
        match $self {
            AnySession::Tmux($adapter) => $call,
            AnySession::Process($adapter) => $call,
        }
    };
}

#[async_trait]
impl SessionAdapter for AnySession {
    async fn spawn(
        &self,
        name: &str,
        cwd: &Path,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<String, SessionError> {
        delegate!(self, a => a.spawn(name, cwd, cmd, env).await)
    }

    async fn send_literal(&self, id: &str, text: &str) -> Result<(), SessionError> {
        delegate!(self, a => a.send_literal(id, text).await)
    }

    async fn send_enter(&self, id: &str) -> Result<(), SessionError> {
        delegate!(self, a => a.send_enter(id).await)
    }

    async fn suspend(&self, id: &str) -> Result<(), SessionError> {
        delegate!(self, a => a.suspend(id).await)
    }

    async fn foreground(&self, id: &str) -> Result<(), SessionError> {
        delegate!(self, a => a.foreground(id).await)
    }

    async fn kill(&self, id: &str) -> Result<(), SessionError> {
        delegate!(self, a => a.kill(id).await)
    }

    async fn is_alive(&self, id: &str) -> Result<bool, SessionError> {
        delegate!(self, a => a.is_alive(id).await)
    }

    async fn capture_output(&self, id: &str, lines: u32) -> Result<String, SessionError> {
        delegate!(self, a => a.capture_output(id, lines).await)
    }

    async fn pid(&self, id: &str) -> Result<Option<u32>, SessionError> {
        delegate!(self, a => a.pid(id).await)
    }

    async fn exit_code(&self, id: &str) -> Result<Option<i32>, SessionError> {
        delegate!(self, a => a.exit_code(id).await)
    }

    async fn take_output(&self, id: &str) -> Option<mpsc::Receiver<String>> {
        delegate!(self, a => a.take_output(id).await)
    }
}
