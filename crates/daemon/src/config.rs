// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: flags, environment overrides, defaults.
//!
//! Precedence is defaults < flags < environment (`DATA_DIR`, `RPC_PORT`,
//! `MAX_WORKERS`, `MAX_CONCURRENT_TASKS`). Unparseable values are a
//! configuration error (exit 2), never silently defaulted.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default RPC port (loopback only).
pub const DEFAULT_RPC_PORT: u16 = 7465;

#[derive(Debug, Parser)]
#[command(
    name = "gafferd",
    version,
    about = "Gaffer task orchestrator daemon",
    long_about = "Converts a queue of typed tasks into supervised worker \
processes (tmux sessions when available, raw child processes otherwise), \
coordinated over a streaming JSON-RPC connection."
)]
pub struct Cli {
    /// Directory for state, logs, and snapshots
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// TCP port for the RPC hub (0 picks an ephemeral port)
    #[arg(long)]
    pub rpc_port: Option<u16>,

    /// Maximum live workers
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Maximum concurrently running tasks
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Autosave interval in milliseconds
    #[arg(long)]
    pub autosave_ms: Option<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    BadValue { var: String, value: String },
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub rpc_port: u16,
    pub max_workers: usize,
    pub max_concurrent: usize,
    pub autosave: Duration,
    pub tick: Duration,
    pub poll: Duration,
}

impl Config {
    /// Merge flags and environment on top of the defaults.
    ///
    /// `env` is passed in (rather than read here) so tests never touch
    /// process-global state.
    pub fn resolve(
        cli: &Cli,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self {
            data_dir: cli.data_dir.clone().unwrap_or_else(default_data_dir),
            rpc_port: cli.rpc_port.unwrap_or(DEFAULT_RPC_PORT),
            max_workers: cli.max_workers.unwrap_or(6),
            max_concurrent: cli.max_concurrent.unwrap_or(4),
            autosave: Duration::from_millis(cli.autosave_ms.unwrap_or(30_000)),
            tick: Duration::from_secs(1),
            poll: Duration::from_secs(5),
        };

        for (key, value) in env {
            match key.as_str() {
                "DATA_DIR" => config.data_dir = PathBuf::from(value),
                "RPC_PORT" => config.rpc_port = parse(&key, &value)?,
                "MAX_WORKERS" => config.max_workers = parse(&key, &value)?,
                "MAX_CONCURRENT_TASKS" => config.max_concurrent = parse(&key, &value)?,
                _ => {}
            }
        }

        Ok(config)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("logs/daemon.log")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("gafferd.lock")
    }
}

fn parse<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::BadValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Default data directory: the platform data dir, XDG-style fallback
/// otherwise.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("gaffer");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/share/gaffer");
    }
    PathBuf::from("gaffer-data")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
