//! Daemon boot, single-instance lock, and graceful shutdown.

use crate::prelude::*;
use std::time::Duration;

#[test]
fn boots_and_shuts_down_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::boot(dir.path());
    assert!(daemon.port > 0);

    daemon.terminate();

    // Shutdown flushed a snapshot
    assert!(dir.path().join("state.json").exists());
}

#[test]
fn second_instance_on_same_data_dir_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::boot(dir.path());

    let mut cmd = gafferd_cmd();
    cmd.arg("--data-dir")
        .arg(dir.path())
        .arg("--rpc-port")
        .arg("0");
    let assert = assert_cmd::Command::from_std(cmd).assert().code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("already running"), "stderr was: {stderr}");

    drop(daemon);
}

#[test]
fn lock_is_released_after_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    Daemon::boot(dir.path()).terminate();

    // A fresh instance can take over the same data dir
    let daemon = Daemon::boot(dir.path());
    daemon.terminate();
}

#[test]
fn writes_a_daemon_log() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::boot(dir.path());

    let log = dir.path().join("logs/daemon.log");
    assert!(
        wait_until(Duration::from_secs(5), || log.exists()),
        "daemon log never appeared"
    );
    drop(daemon);
}
