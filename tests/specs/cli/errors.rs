//! Configuration and startup error exit codes.

use crate::prelude::*;

#[test]
fn unknown_flag_exits_two() {
    assert_cmd::Command::new(gafferd_binary())
        .arg("--frobnicate")
        .assert()
        .code(2);
}

#[test]
fn unparseable_flag_value_exits_two() {
    assert_cmd::Command::new(gafferd_binary())
        .args(["--rpc-port", "not-a-port"])
        .assert()
        .code(2);
}

#[test]
fn bad_env_value_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = gafferd_cmd();
    cmd.arg("--data-dir").arg(dir.path());
    cmd.env("RPC_PORT", "definitely-not-a-port");
    assert_cmd::Command::from_std(cmd).assert().code(2);
}

#[test]
fn corrupt_state_file_exits_three() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("state.json"), "{this is not json").unwrap();

    let mut cmd = gafferd_cmd();
    cmd.arg("--data-dir")
        .arg(dir.path())
        .arg("--rpc-port")
        .arg("0");
    let assert = assert_cmd::Command::from_std(cmd).assert().code(3);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("state file"), "stderr was: {stderr}");
}

#[test]
fn unsupported_snapshot_version_exits_three() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = serde_json::json!({
        "version": "9.9.9",
        "timestamp": "2025-06-01T00:00:00Z",
        "session": {
            "id": "old",
            "startTime": "2025-06-01T00:00:00Z",
            "lastUpdate": "2025-06-01T00:00:00Z",
        },
    });
    std::fs::write(
        dir.path().join("state.json"),
        serde_json::to_string(&snapshot).unwrap(),
    )
    .unwrap();

    let mut cmd = gafferd_cmd();
    cmd.arg("--data-dir")
        .arg(dir.path())
        .arg("--rpc-port")
        .arg("0");
    assert_cmd::Command::from_std(cmd).assert().code(3);
}
