// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gaffer-adapters: Process and terminal-multiplexer adapters

pub mod metrics;
pub mod probe;
pub mod process;
pub mod session;
pub mod subprocess;

pub use metrics::ResourceSample;
pub use probe::ProbeReport;
pub use process::{signal_pid, ProcessAdapter};
pub use session::{SessionAdapter, SessionError, TmuxAdapter};

#[cfg(any(test, feature = "test-support"))]
pub use session::{FakeSession, FakeSessionAdapter, SessionCall};
