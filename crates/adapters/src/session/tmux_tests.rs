// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

/// Random prefix for this test run to avoid conflicts with parallel test runs.
static TEST_PREFIX: LazyLock<String> = LazyLock::new(|| {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    format!("t{:04x}", nanos & 0xFFFF)
});

/// Counter for generating unique session names across parallel tests.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unique_name(suffix: &str) -> String {
    let id = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", *TEST_PREFIX, suffix, id)
}

/// Check if tmux is available on this system
fn tmux_available() -> bool {
    std::process::Command::new("tmux")
        .arg("-V")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! skip_without_tmux {
    () => {
        if !tmux_available() {
            eprintln!("skipping: tmux not available");
            return;
        }
    };
}

#[tokio::test]
async fn spawn_creates_session_and_returns_id() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    let name = unique_name("spawn");

    let id = adapter
        .spawn(&name, Path::new("/tmp"), "sleep 60", &[])
        .await
        .unwrap();

    assert_eq!(id, format!("gaffer-{}", name));
    assert!(adapter.is_alive(&id).await.unwrap());

    adapter.kill(&id).await.unwrap();
    assert!(!adapter.is_alive(&id).await.unwrap());
}

#[tokio::test]
async fn spawn_rejects_missing_cwd() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    let err = adapter
        .spawn(
            &unique_name("badcwd"),
            Path::new("/definitely/not/a/dir"),
            "true",
            &[],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::SpawnFailed(_)));
}

#[tokio::test]
async fn pid_resolves_for_live_session() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    let id = adapter
        .spawn(&unique_name("pid"), Path::new("/tmp"), "sleep 60", &[])
        .await
        .unwrap();

    let pid = adapter.pid(&id).await.unwrap();
    assert!(pid.is_some());

    adapter.kill(&id).await.unwrap();
}

#[tokio::test]
async fn send_to_dead_session_is_not_found() {
    skip_without_tmux!();
    let adapter = TmuxAdapter::new();
    let err = adapter
        .send_literal("gaffer-no-such-session", "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotFound(_)));
}
