// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker lifecycle management.
//!
//! Spawns, supervises, pauses, resumes, and kills worker sessions; owns the
//! worker records with their name and quick-access-key indexes. The session
//! surface (multiplexer pane or raw process) is behind a [`SessionAdapter`],
//! so this module never talks to tmux or the OS directly.

use crate::error::OrchestratorError;
use crate::render::NameGenerator;
use gaffer_adapters::metrics;
use gaffer_adapters::session::{SessionAdapter, SessionError};
use gaffer_adapters::signal_pid;
use gaffer_core::{
    Attachment, Event, IdGen, OutputRing, ResourceUsage, TaskId, TaskType, Worker, WorkerId,
    WorkerStatus,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// How this deployment attaches workers, decided once by the startup probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentMode {
    Multiplexer { pause_capable: bool },
    Process,
}

#[derive(Debug, Clone)]
pub struct WorkerManagerConfig {
    pub max_workers: usize,
    pub output_lines: usize,
    pub spawn_timeout: Duration,
    /// Working directory new sessions start in
    pub workdir: PathBuf,
}

impl Default for WorkerManagerConfig {
    fn default() -> Self {
        Self {
            max_workers: 6,
            output_lines: 1000,
            spawn_timeout: Duration::from_secs(30),
            workdir: std::env::temp_dir(),
        }
    }
}

/// A busy worker whose session finished.
#[derive(Debug, Clone)]
pub struct ExitReport {
    pub worker_id: WorkerId,
    pub task_id: TaskId,
    /// `None` when the session disappeared without a readable exit code
    pub exit_code: Option<i32>,
}

#[derive(Default)]
struct WorkerTable {
    workers: IndexMap<WorkerId, Worker>,
    /// Adapter session id per worker
    sessions: HashMap<WorkerId, String>,
}

impl WorkerTable {
    fn live_count(&self) -> usize {
        self.workers.values().filter(|w| w.status.is_live()).count()
    }

    fn name_taken(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.workers
            .values()
            .any(|w| w.status.is_live() && w.descriptive_name.to_lowercase() == lowered)
    }

    fn free_quick_key(&self) -> Option<u8> {
        let taken: BTreeSet<u8> = self
            .workers
            .values()
            .filter(|w| w.status.is_live())
            .filter_map(|w| w.quick_access_key)
            .collect();
        (1..=9).find(|k| !taken.contains(k))
    }
}

/// Owns worker records and drives their sessions.
pub struct WorkerManager<S: SessionAdapter, G: IdGen> {
    config: WorkerManagerConfig,
    mode: AttachmentMode,
    adapter: S,
    ids: G,
    namer: Arc<dyn NameGenerator>,
    events: broadcast::Sender<Event>,
    inner: Arc<Mutex<WorkerTable>>,
}

impl<S: SessionAdapter, G: IdGen> WorkerManager<S, G> {
    pub fn new(
        config: WorkerManagerConfig,
        mode: AttachmentMode,
        adapter: S,
        ids: G,
        namer: Arc<dyn NameGenerator>,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            config,
            mode,
            adapter,
            ids,
            namer,
            events,
            inner: Arc::new(Mutex::new(WorkerTable::default())),
        }
    }

    pub fn mode(&self) -> AttachmentMode {
        self.mode
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().live_count()
    }

    pub fn list(&self) -> Vec<Worker> {
        self.inner.lock().workers.values().cloned().collect()
    }

    pub fn get(&self, id: &WorkerId) -> Option<Worker> {
        self.inner.lock().workers.get(id).cloned()
    }

    /// Lookup by exact id, then exact case-insensitive name, then first
    /// case-insensitive substring match in insertion order.
    pub fn find(&self, query: &str) -> Option<Worker> {
        let table = self.inner.lock();
        if let Some(worker) = table.workers.get(query) {
            return Some(worker.clone());
        }
        let lowered = query.to_lowercase();
        if let Some(worker) = table
            .workers
            .values()
            .find(|w| w.descriptive_name.to_lowercase() == lowered)
        {
            return Some(worker.clone());
        }
        table
            .workers
            .values()
            .find(|w| w.descriptive_name.to_lowercase().contains(&lowered))
            .cloned()
    }

    /// Idle live worker able to service the task; ties break on lowest cpu,
    /// then insertion order.
    pub fn find_idle(&self, task_type: TaskType, required: &BTreeSet<String>) -> Option<WorkerId> {
        let table = self.inner.lock();
        let mut best: Option<(&Worker, f64)> = None;
        for worker in table.workers.values() {
            if !worker.is_idle() || !worker.can_service(task_type, required) {
                continue;
            }
            let cpu = worker.resources.cpu_percent;
            if best.map(|(_, best_cpu)| cpu < best_cpu).unwrap_or(true) {
                best = Some((worker, cpu));
            }
        }
        best.map(|(w, _)| w.id.clone())
    }

    /// Spawn a new worker session running `command`.
    pub async fn spawn(
        &self,
        worker_type: TaskType,
        capabilities: BTreeSet<String>,
        command: &str,
        env: &[(String, String)],
        epoch_ms: u64,
    ) -> Result<Worker, OrchestratorError> {
        let (id, name, quick_access_key) = {
            let table = self.inner.lock();
            let live = table.live_count();
            if live >= self.config.max_workers {
                return Err(OrchestratorError::CapacityExceeded {
                    live,
                    max: self.config.max_workers,
                });
            }
            let id = WorkerId::new(self.ids.next());
            let name = self.unique_name(&table, worker_type);
            let key = table.free_quick_key();
            (id, name, key)
        };

        debug!(worker = %id, name, "spawning worker");
        let spawned = tokio::time::timeout(
            self.config.spawn_timeout,
            self.adapter
                .spawn(&name, &self.config.workdir, command, env),
        )
        .await;

        let session_id = match spawned {
            Err(_elapsed) => {
                // Tear down whatever half-exists under the would-be session name
                if matches!(self.mode, AttachmentMode::Multiplexer { .. }) {
                    let _ = self.adapter.kill(&format!("gaffer-{name}")).await;
                }
                return Err(OrchestratorError::SpawnTimeout(self.config.spawn_timeout));
            }
            Ok(Err(e)) => {
                // Record the failure so it is visible; no key is held
                let worker = Worker {
                    id: id.clone(),
                    descriptive_name: name,
                    quick_access_key: None,
                    worker_type,
                    capabilities,
                    status: WorkerStatus::Error,
                    attachment: Attachment::Process { pid: 0 },
                    current_task: None,
                    resources: ResourceUsage::default(),
                    output: OutputRing::new(self.config.output_lines),
                    started_at_ms: epoch_ms,
                    last_active_ms: epoch_ms,
                };
                self.inner.lock().workers.insert(id, worker.clone());
                let _ = self.events.send(Event::WorkerUpdate { worker });
                return Err(OrchestratorError::Dispatch(e.to_string()));
            }
            Ok(Ok(session_id)) => session_id,
        };

        let attachment = match self.mode {
            AttachmentMode::Multiplexer { .. } => Attachment::Multiplexer {
                session: session_id.clone(),
            },
            AttachmentMode::Process => {
                let pid = self
                    .adapter
                    .pid(&session_id)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(0);
                Attachment::Process { pid }
            }
        };

        let worker = Worker {
            id: id.clone(),
            descriptive_name: name,
            quick_access_key,
            worker_type,
            capabilities,
            status: WorkerStatus::Running,
            attachment,
            current_task: None,
            resources: ResourceUsage::default(),
            output: OutputRing::new(self.config.output_lines),
            started_at_ms: epoch_ms,
            last_active_ms: epoch_ms,
        };

        {
            let mut table = self.inner.lock();
            table.workers.insert(id.clone(), worker.clone());
            table.sessions.insert(id.clone(), session_id.clone());
        }

        if let Some(rx) = self.adapter.take_output(&session_id).await {
            self.spawn_output_pump(id.clone(), rx);
        }

        let _ = self.events.send(Event::WorkerUpdate {
            worker: worker.clone(),
        });
        Ok(worker)
    }

    /// Inject a rendered command into an idle worker's session.
    pub async fn assign(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        command: &str,
        epoch_ms: u64,
    ) -> Result<(), OrchestratorError> {
        let session = {
            let table = self.inner.lock();
            let worker = table
                .workers
                .get(worker_id)
                .ok_or_else(|| OrchestratorError::NotFound(worker_id.to_string()))?;
            if !worker.is_idle() {
                return Err(OrchestratorError::Busy(format!(
                    "worker {} is not idle",
                    worker.descriptive_name
                )));
            }
            self.session_of(&table, worker_id)?
        };

        self.adapter
            .send_literal(&session, command)
            .await
            .map_err(|e| OrchestratorError::Dispatch(e.to_string()))?;
        self.adapter
            .send_enter(&session)
            .await
            .map_err(|e| OrchestratorError::Dispatch(e.to_string()))?;

        let worker = {
            let mut table = self.inner.lock();
            let worker = table
                .workers
                .get_mut(worker_id)
                .ok_or_else(|| OrchestratorError::NotFound(worker_id.to_string()))?;
            worker.current_task = Some(task_id.clone());
            worker.touch(epoch_ms);
            worker.clone()
        };
        let _ = self.events.send(Event::WorkerUpdate { worker });
        Ok(())
    }

    /// Suspend a running worker.
    pub async fn pause(&self, worker_id: &WorkerId, epoch_ms: u64) -> Result<Worker, OrchestratorError> {
        let session = self.expect_status(worker_id, WorkerStatus::Running)?;

        match self.mode {
            AttachmentMode::Multiplexer {
                pause_capable: false,
            } => {
                // Unknown suspend sequence: stop the pane process directly
                let pid = self.resolve_pid(worker_id, &session).await?;
                signal_pid(pid, "-STOP")
                    .await
                    .map_err(|e| OrchestratorError::Busy(e.to_string()))?;
            }
            _ => {
                self.adapter
                    .suspend(&session)
                    .await
                    .map_err(map_session_error)?;
            }
        }

        self.transition(worker_id, WorkerStatus::Paused, epoch_ms)
            .ok_or_else(|| OrchestratorError::NotFound(worker_id.to_string()))
    }

    /// Resume a paused worker.
    pub async fn resume(&self, worker_id: &WorkerId, epoch_ms: u64) -> Result<Worker, OrchestratorError> {
        let session = self.expect_status(worker_id, WorkerStatus::Paused)?;

        match self.mode {
            AttachmentMode::Multiplexer {
                pause_capable: false,
            } => {
                let pid = self.resolve_pid(worker_id, &session).await?;
                signal_pid(pid, "-CONT")
                    .await
                    .map_err(|e| OrchestratorError::Busy(e.to_string()))?;
            }
            _ => {
                self.adapter
                    .foreground(&session)
                    .await
                    .map_err(map_session_error)?;
            }
        }

        self.transition(worker_id, WorkerStatus::Running, epoch_ms)
            .ok_or_else(|| OrchestratorError::NotFound(worker_id.to_string()))
    }

    /// Kill a worker's session and retire the record.
    pub async fn stop(&self, worker_id: &WorkerId, epoch_ms: u64) -> Result<Worker, OrchestratorError> {
        let session = {
            let table = self.inner.lock();
            if !table.workers.contains_key(worker_id) {
                return Err(OrchestratorError::NotFound(worker_id.to_string()));
            }
            table.sessions.get(worker_id).cloned()
        };

        if let Some(session) = session {
            if let Err(e) = self.adapter.kill(&session).await {
                warn!(worker = %worker_id, error = %e, "session kill failed");
            }
        }

        let worker = self
            .transition(worker_id, WorkerStatus::Stopped, epoch_ms)
            .ok_or_else(|| OrchestratorError::NotFound(worker_id.to_string()))?;
        let _ = self.events.send(Event::WorkerStopped {
            worker_id: worker_id.clone(),
        });
        Ok(worker)
    }

    /// Sweep busy workers for finished sessions.
    pub async fn watch_exits(&self, epoch_ms: u64) -> Vec<ExitReport> {
        let busy: Vec<(WorkerId, TaskId, String)> = {
            let table = self.inner.lock();
            table
                .workers
                .values()
                .filter(|w| w.status.is_live() && w.current_task.is_some())
                .filter_map(|w| {
                    let task = w.current_task.clone()?;
                    let session = table.sessions.get(&w.id)?.clone();
                    Some((w.id.clone(), task, session))
                })
                .collect()
        };

        let mut reports = Vec::new();
        for (worker_id, task_id, session) in busy {
            let exit_code = self.adapter.exit_code(&session).await.unwrap_or(None);
            let finished = match exit_code {
                Some(_) => true,
                None => !self.adapter.is_alive(&session).await.unwrap_or(false),
            };
            if !finished {
                continue;
            }

            // Dead panes linger when remain-on-exit is set; clean them up
            if let Err(e) = self.adapter.kill(&session).await {
                warn!(worker = %worker_id, error = %e, "session cleanup failed");
            }

            if self
                .transition(&worker_id, WorkerStatus::Stopped, epoch_ms)
                .is_some()
            {
                let _ = self.events.send(Event::WorkerStopped {
                    worker_id: worker_id.clone(),
                });
                reports.push(ExitReport {
                    worker_id,
                    task_id,
                    exit_code,
                });
            }
        }
        reports
    }

    /// Update resource samples for live workers. Failed samples keep the
    /// previous reading.
    pub async fn poll_resources(&self) {
        let targets: Vec<(WorkerId, Option<u32>, Option<String>)> = {
            let table = self.inner.lock();
            table
                .workers
                .values()
                .filter(|w| w.status.is_live())
                .map(|w| {
                    (
                        w.id.clone(),
                        w.attachment.pid(),
                        table.sessions.get(&w.id).cloned(),
                    )
                })
                .collect()
        };

        for (worker_id, pid, session) in targets {
            let pid = match (pid, &session) {
                (Some(pid), _) => Some(pid),
                (None, Some(session)) => self.adapter.pid(session).await.ok().flatten(),
                (None, None) => None,
            };
            let Some(pid) = pid else { continue };
            let Some(sample) = metrics::sample_pid(pid).await else {
                continue;
            };

            let worker = {
                let mut table = self.inner.lock();
                let Some(worker) = table.workers.get_mut(&worker_id) else {
                    continue;
                };
                worker.resources = ResourceUsage {
                    cpu_percent: sample.cpu_percent,
                    memory_mb: sample.memory_mb,
                };
                worker.clone()
            };
            let _ = self.events.send(Event::WorkerUpdate { worker });
        }

        // Multiplexer panes have no output stream; refresh their rings here
        if matches!(self.mode, AttachmentMode::Multiplexer { .. }) {
            self.refresh_pane_output().await;
        }
    }

    /// Adopt a worker record without a live session (restart recovery).
    pub fn adopt(&self, worker: Worker) {
        self.inner
            .lock()
            .workers
            .insert(worker.id.clone(), worker);
    }

    /// Replace every record (snapshot restore). Sessions are dropped; the
    /// caller is responsible for having stopped live workers first.
    pub fn replace_all(&self, workers: Vec<Worker>) {
        let mut table = self.inner.lock();
        table.workers.clear();
        table.sessions.clear();
        for worker in workers {
            table.workers.insert(worker.id.clone(), worker);
        }
    }

    /// Record a task on a worker whose session was spawned with the task's
    /// command already running (no injection needed).
    pub fn attach_task(&self, worker_id: &WorkerId, task_id: &TaskId, epoch_ms: u64) {
        let worker = {
            let mut table = self.inner.lock();
            let Some(worker) = table.workers.get_mut(worker_id) else {
                return;
            };
            worker.current_task = Some(task_id.clone());
            worker.touch(epoch_ms);
            worker.clone()
        };
        let _ = self.events.send(Event::WorkerUpdate { worker });
    }

    async fn refresh_pane_output(&self) {
        let targets: Vec<(WorkerId, String)> = {
            let table = self.inner.lock();
            table
                .workers
                .values()
                .filter(|w| w.status.is_live())
                .filter_map(|w| table.sessions.get(&w.id).map(|s| (w.id.clone(), s.clone())))
                .collect()
        };
        for (worker_id, session) in targets {
            let Ok(captured) = self
                .adapter
                .capture_output(&session, self.config.output_lines as u32)
                .await
            else {
                continue;
            };
            let mut table = self.inner.lock();
            if let Some(worker) = table.workers.get_mut(&worker_id) {
                worker.output.clear();
                for line in captured.lines() {
                    worker.output.push(line);
                }
            }
        }
    }

    fn spawn_output_pump(&self, worker_id: WorkerId, mut rx: tokio::sync::mpsc::Receiver<String>) {
        let inner = Arc::clone(&self.inner);
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                {
                    let mut table = inner.lock();
                    if let Some(worker) = table.workers.get_mut(&worker_id) {
                        worker.output.push(line.clone());
                    }
                }
                let _ = events.send(Event::WorkerOutput {
                    worker_id: worker_id.clone(),
                    line,
                });
            }
        });
    }

    fn unique_name(&self, table: &WorkerTable, worker_type: TaskType) -> String {
        let base = self.namer.generate(worker_type);
        if !table.name_taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !table.name_taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn session_of(&self, table: &WorkerTable, worker_id: &WorkerId) -> Result<String, OrchestratorError> {
        table
            .sessions
            .get(worker_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(worker_id.to_string()))
    }

    fn expect_status(
        &self,
        worker_id: &WorkerId,
        status: WorkerStatus,
    ) -> Result<String, OrchestratorError> {
        let table = self.inner.lock();
        let worker = table
            .workers
            .get(worker_id)
            .ok_or_else(|| OrchestratorError::NotFound(worker_id.to_string()))?;
        if worker.status != status {
            return Err(OrchestratorError::Busy(format!(
                "worker {} is {}, expected {}",
                worker.descriptive_name, worker.status, status
            )));
        }
        self.session_of(&table, worker_id)
    }

    async fn resolve_pid(&self, worker_id: &WorkerId, session: &str) -> Result<u32, OrchestratorError> {
        let attached = self
            .inner
            .lock()
            .workers
            .get(worker_id)
            .and_then(|w| w.attachment.pid());
        if let Some(pid) = attached {
            return Ok(pid);
        }
        self.adapter
            .pid(session)
            .await
            .map_err(map_session_error)?
            .ok_or_else(|| OrchestratorError::Busy(format!("no pid for worker {worker_id}")))
    }

    /// Apply a status transition, maintaining the quick-key invariant, and
    /// broadcast the update. Returns `None` when the worker is unknown.
    fn transition(&self, worker_id: &WorkerId, status: WorkerStatus, epoch_ms: u64) -> Option<Worker> {
        let worker = {
            let mut table = self.inner.lock();
            let worker = table.workers.get_mut(worker_id)?;
            worker.status = status;
            if status.is_terminal() {
                worker.quick_access_key = None;
                worker.current_task = None;
            }
            worker.touch(epoch_ms);
            let worker = worker.clone();
            if status.is_terminal() {
                table.sessions.remove(worker_id);
            }
            worker
        };
        let _ = self.events.send(Event::WorkerUpdate {
            worker: worker.clone(),
        });
        Some(worker)
    }
}

fn map_session_error(e: SessionError) -> OrchestratorError {
    match e {
        SessionError::NotFound(id) => OrchestratorError::NotFound(id),
        SessionError::SpawnFailed(m) => OrchestratorError::Dispatch(m),
        // Failed command on a healthy session is retryable
        SessionError::CommandFailed(m) => OrchestratorError::Busy(m),
    }
}

#[cfg(test)]
#[path = "workers_tests.rs"]
mod tests;
