// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gaffer Daemon (gafferd)
//!
//! Background process that owns the orchestrator and serves the RPC hub.
//!
//! Exit codes: 0 clean shutdown, 1 init error, 2 bad config, 3 state file
//! corrupt or unsupported version.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use clap::Parser;
use fs2::FileExt;
use std::io::Write;
use std::sync::Arc;

use gaffer_core::{Event, SystemClock, UuidIdGen};
use gaffer_daemon::attach::{self, AnySession};
use gaffer_daemon::config::{Cli, Config};
use gaffer_daemon::hub::Hub;
use gaffer_engine::{
    CallsignGenerator, ConflictConfig, ConflictDetector, Orchestrator, OrchestratorConfig,
    OrchestratorDeps, OrchestratorError, SchedulerConfig, ShellRenderer, SmartScheduler,
    WorkerManager, WorkerManagerConfig,
};
use gaffer_storage::{StateError, StateManager};
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::{error, info};

const EXIT_INIT: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_STATE: i32 = 3;

type Orch = Orchestrator<AnySession, UuidIdGen, SystemClock>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match Config::resolve(&cli, std::env::vars()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        eprintln!("error: cannot create data dir {}: {e}", config.data_dir.display());
        std::process::exit(EXIT_INIT);
    }

    // Single instance per data dir
    let _lock = match acquire_lock(&config) {
        Ok(lock) => lock,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(EXIT_INIT);
        }
    };

    rotate_log_if_needed(&config.log_path());
    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: cannot set up logging: {e}");
            std::process::exit(EXIT_INIT);
        }
    };

    info!(data_dir = %config.data_dir.display(), "starting gafferd");

    let (adapter, mode) = attach::detect().await;
    let orch = match build_orchestrator(&config, adapter, mode) {
        Ok(orch) => Arc::new(orch),
        Err(OrchestratorError::State(e @ (StateError::Corrupt(_) | StateError::UnsupportedVersion { .. }))) => {
            error!("unusable state file: {e}");
            eprintln!("error: unusable state file: {e}");
            std::process::exit(EXIT_STATE);
        }
        Err(e) => {
            error!("failed to start: {e}");
            eprintln!("error: {e}");
            std::process::exit(EXIT_INIT);
        }
    };

    let listener = match TcpListener::bind(("127.0.0.1", config.rpc_port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("cannot bind rpc port {}: {e}", config.rpc_port);
            eprintln!("error: cannot bind rpc port {}: {e}", config.rpc_port);
            std::process::exit(EXIT_INIT);
        }
    };
    let port = listener.local_addr().map(|a| a.port()).unwrap_or(config.rpc_port);

    let hub = Hub::new(Arc::clone(&orch));
    tokio::spawn(hub.run(listener));

    info!(port, "gafferd ready");

    // Signal ready for parent process (CLI or tests waiting for startup)
    println!("READY port={port}");

    run_loop(&config, &orch).await;

    orch.shutdown();
    info!("gafferd stopped");
}

/// Main loop: dispatch tick, autosave tick, resource poller, signals.
async fn run_loop(config: &Config, orch: &Arc<Orch>) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            error!("cannot install SIGTERM handler: {e}");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sig) => sig,
        Err(e) => {
            error!("cannot install SIGINT handler: {e}");
            return;
        }
    };

    // NOTE: intervals are created outside the loop - tokio::select!
    // re-evaluates branches each iteration, so constructing them inside
    // would reset the timers on every event.
    let mut tick = tokio::time::interval(config.tick);
    let mut autosave = tokio::time::interval(config.autosave);
    let mut poll = tokio::time::interval(config.poll);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let report = orch.tick().await;
                if report.dispatched + report.completed + report.failed > 0 {
                    info!(
                        dispatched = report.dispatched,
                        completed = report.completed,
                        failed = report.failed,
                        "tick"
                    );
                }
            }

            _ = autosave.tick() => {
                orch.autosave();
            }

            _ = poll.tick() => {
                orch.poll_resources().await;
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }
}

fn build_orchestrator(
    config: &Config,
    adapter: AnySession,
    mode: gaffer_engine::AttachmentMode,
) -> Result<Orch, OrchestratorError> {
    let (events, _) = broadcast::channel::<Event>(1024);

    let workers = WorkerManager::new(
        WorkerManagerConfig {
            max_workers: config.max_workers,
            workdir: config.data_dir.clone(),
            ..WorkerManagerConfig::default()
        },
        mode,
        adapter,
        UuidIdGen,
        Arc::new(CallsignGenerator::new()),
        events.clone(),
    );

    Orchestrator::new(
        OrchestratorDeps {
            clock: SystemClock,
            ids: UuidIdGen,
            workers,
            conflicts: ConflictDetector::new(ConflictConfig::default()),
            scheduler: SmartScheduler::new(SchedulerConfig {
                max_concurrent_tasks: config.max_concurrent,
                ..SchedulerConfig::default()
            }),
            state: StateManager::new(&config.data_dir),
            renderer: Arc::new(ShellRenderer::new()),
            events,
        },
        OrchestratorConfig::default(),
    )
}

/// Take the data-dir lock, writing our pid into it.
fn acquire_lock(config: &Config) -> Result<std::fs::File, String> {
    let path = config.lock_path();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| format!("error: cannot open lock file {}: {e}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
        let pid = std::fs::read_to_string(&path).unwrap_or_default();
        let pid = pid.trim();
        return Err(if pid.is_empty() {
            "gafferd is already running for this data dir".to_string()
        } else {
            format!("gafferd is already running for this data dir (pid: {pid})")
        });
    }

    let _ = file.set_len(0);
    let _ = writeln!(file, "{}", std::process::id());
    Ok(file)
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` → `daemon.log.1` → `daemon.log.2` → `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.log_path();
    let parent = log_path
        .parent()
        .ok_or_else(|| std::io::Error::other("log path has no parent"))?;
    std::fs::create_dir_all(parent)?;
    let file_name = log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log path has no file name"))?;

    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
