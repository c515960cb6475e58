//! Behavioral specifications for the gafferd daemon.
//!
//! These tests are black-box: they invoke the daemon binary and verify
//! stdout, exit codes, and the RPC wire protocol.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

// cli/
#[path = "specs/cli/errors.rs"]
mod cli_errors;
#[path = "specs/cli/help.rs"]
mod cli_help;

// daemon/
#[path = "specs/daemon/lifecycle.rs"]
mod daemon_lifecycle;
#[path = "specs/daemon/restart.rs"]
mod daemon_restart;
#[path = "specs/daemon/rpc.rs"]
mod daemon_rpc;
