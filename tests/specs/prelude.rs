//! Test helpers for behavioral specifications.
//!
//! Boots a real `gafferd` on an ephemeral port and speaks the
//! length-prefixed JSON wire protocol over a blocking TCP stream.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// How long to wait for a frame before a test gives up.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns the path to a binary, checking llvm-cov target directory first.
/// Falls back to resolving relative to the test binary itself when
/// CARGO_MANIFEST_DIR is stale (e.g. compiled by a removed worktree
/// into a shared target directory).
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let llvm_cov_path = manifest_dir.join("target/llvm-cov-target/debug").join(name);
    if llvm_cov_path.exists() {
        return llvm_cov_path;
    }

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    // The test binary lives at target/debug/deps/specs-<hash>, so its
    // grandparent is target/debug/ where gafferd is built.
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

/// Returns the path to the gafferd daemon binary.
pub fn gafferd_binary() -> PathBuf {
    binary_path("gafferd")
}

/// A Command for the daemon with a scrubbed environment.
pub fn gafferd_cmd() -> Command {
    let mut cmd = Command::new(gafferd_binary());
    cmd.env_remove("DATA_DIR")
        .env_remove("RPC_PORT")
        .env_remove("MAX_WORKERS")
        .env_remove("MAX_CONCURRENT_TASKS");
    cmd
}

/// A running daemon bound to an ephemeral port.
pub struct Daemon {
    child: Child,
    pub port: u16,
}

impl Daemon {
    /// Boot gafferd on `data_dir` and wait for its READY line.
    pub fn boot(data_dir: &Path) -> Daemon {
        let mut child = gafferd_cmd()
            .arg("--data-dir")
            .arg(data_dir)
            .arg("--rpc-port")
            .arg("0")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn gafferd");

        let stdout = child.stdout.take().expect("daemon stdout");
        let mut lines = BufReader::new(stdout).lines();
        let ready = lines
            .next()
            .and_then(|l| l.ok())
            .unwrap_or_else(|| panic!("daemon exited before READY: {:?}", child.wait()));
        let port: u16 = ready
            .strip_prefix("READY port=")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or_else(|| panic!("unexpected READY line: {ready}"));

        Daemon { child, port }
    }

    /// Connect a fresh client. The daemon pushes `initialState` first;
    /// it is consumed and returned.
    pub fn connect(&self) -> (TcpStream, Value) {
        let stream = TcpStream::connect(("127.0.0.1", self.port)).expect("connect to daemon");
        stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
        let mut stream = stream;
        let initial = read_frame(&mut stream);
        assert_eq!(initial["method"], "initialState");
        (stream, initial)
    }

    /// Graceful shutdown via SIGTERM; asserts a clean exit.
    pub fn terminate(mut self) {
        let pid = self.child.id().to_string();
        let _ = Command::new("kill").args(["-TERM", &pid]).status();
        let status = self.child.wait().expect("wait for daemon");
        assert!(status.success(), "daemon exited with {status}");
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Write one length-prefixed JSON frame.
pub fn write_frame(stream: &mut TcpStream, value: &Value) {
    let payload = serde_json::to_vec(value).unwrap();
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .unwrap();
    stream.write_all(&payload).unwrap();
}

/// Read one length-prefixed JSON frame.
pub fn read_frame(stream: &mut TcpStream) -> Value {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).expect("frame length");
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).expect("frame payload");
    serde_json::from_slice(&buf).expect("frame JSON")
}

/// Issue a request and wait for its response, skipping pushed notifications.
pub fn call(stream: &mut TcpStream, id: u64, method: &str, params: Value) -> Value {
    write_frame(
        stream,
        &json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}),
    );
    loop {
        let frame = read_frame(stream);
        if frame.get("id") == Some(&json!(id)) {
            return frame;
        }
    }
}

/// Call a tool via tools/call and return the response.
pub fn call_tool(stream: &mut TcpStream, id: u64, name: &str, arguments: Value) -> Value {
    call(
        stream,
        id,
        "tools/call",
        json!({"name": name, "arguments": arguments}),
    )
}

/// Poll until `check` passes or the timeout elapses.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}
