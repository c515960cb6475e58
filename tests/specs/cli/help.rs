//! Help and version output.

use crate::prelude::*;

#[test]
fn help_lists_all_flags() {
    let assert = assert_cmd::Command::new(gafferd_binary())
        .arg("--help")
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    for flag in [
        "--data-dir",
        "--rpc-port",
        "--max-workers",
        "--max-concurrent",
        "--autosave-ms",
    ] {
        assert!(stdout.contains(flag), "help is missing {flag}");
    }
}

#[test]
fn version_prints_and_exits_zero() {
    let assert = assert_cmd::Command::new(gafferd_binary())
        .arg("--version")
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.starts_with("gafferd "));
}
