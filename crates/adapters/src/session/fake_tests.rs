// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn spawn_records_call_and_creates_session() {
    let adapter = FakeSessionAdapter::new();
    let id = adapter
        .spawn("otter", Path::new("/tmp"), "run-it", &[])
        .await
        .unwrap();

    assert_eq!(id, "fake-1");
    let session = adapter.get_session(&id).unwrap();
    assert_eq!(session.name, "otter");
    assert_eq!(session.cmd, "run-it");
    assert!(session.alive);
    assert_eq!(adapter.spawn_count(), 1);
}

#[tokio::test]
async fn fail_next_spawn_fails_once() {
    let adapter = FakeSessionAdapter::new();
    adapter.fail_next_spawn("boom");

    let err = adapter
        .spawn("a", Path::new("/tmp"), "x", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::SpawnFailed(m) if m == "boom"));

    // Next spawn succeeds
    adapter.spawn("b", Path::new("/tmp"), "x", &[]).await.unwrap();
}

#[tokio::test]
async fn suspend_and_foreground_flip_state() {
    let adapter = FakeSessionAdapter::new();
    let id = adapter
        .spawn("w", Path::new("/tmp"), "x", &[])
        .await
        .unwrap();

    adapter.suspend(&id).await.unwrap();
    assert!(adapter.get_session(&id).unwrap().suspended);

    adapter.foreground(&id).await.unwrap();
    assert!(!adapter.get_session(&id).unwrap().suspended);
}

#[tokio::test]
async fn output_stream_receives_pushed_lines() {
    let adapter = FakeSessionAdapter::new();
    let id = adapter
        .spawn("w", Path::new("/tmp"), "x", &[])
        .await
        .unwrap();

    let mut rx = adapter.take_output(&id).await.unwrap();
    adapter.push_output(&id, "hello");
    assert_eq!(rx.recv().await.as_deref(), Some("hello"));

    // Stream can only be taken once
    assert!(adapter.take_output(&id).await.is_none());
}

#[tokio::test]
async fn set_exited_closes_stream_and_sets_code() {
    let adapter = FakeSessionAdapter::new();
    let id = adapter
        .spawn("w", Path::new("/tmp"), "x", &[])
        .await
        .unwrap();
    let mut rx = adapter.take_output(&id).await.unwrap();

    adapter.set_exited(&id, 3);
    assert!(!adapter.is_alive(&id).await.unwrap());
    assert_eq!(adapter.exit_code(&id).await.unwrap(), Some(3));
    // Sender dropped → stream ends
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn capture_output_returns_tail() {
    let adapter = FakeSessionAdapter::new();
    let id = adapter
        .spawn("w", Path::new("/tmp"), "x", &[])
        .await
        .unwrap();
    for i in 0..5 {
        adapter.push_output(&id, format!("line-{i}"));
    }
    let tail = adapter.capture_output(&id, 2).await.unwrap();
    assert_eq!(tail, "line-3\nline-4");
}
