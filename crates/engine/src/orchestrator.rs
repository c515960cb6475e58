// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator: owns every subsystem and runs the dispatch tick.
//!
//! Lock order is fixed to avoid deadlock: task graph → worker manager →
//! conflict detector → scheduler → deadlines → state manager. No lock is
//! held across an adapter await; ticks collect under a lock, release, then
//! commit.

use crate::conflict::{Conflict, ConflictDetector};
use crate::deadline::DeadlineTracker;
use crate::error::OrchestratorError;
use crate::graph::{StatusCounts, TaskGraph};
use crate::render::CommandRenderer;
use crate::scheduler::{Estimate, SchedulingDecision, SmartScheduler, TaskOutcome};
use crate::workers::WorkerManager;
use chrono::{DateTime, Utc};
use gaffer_adapters::session::SessionAdapter;
use gaffer_core::{
    Attachment, Clock, Event, IdGen, SessionData, Task, TaskId, TaskSpec, TaskStatus, Worker,
    WorkerId, WorkerStatus,
};
use gaffer_storage::StateManager;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Everything the orchestrator is built from.
pub struct OrchestratorDeps<S: SessionAdapter, G: IdGen, C: Clock> {
    pub clock: C,
    pub ids: G,
    pub workers: WorkerManager<S, G>,
    pub conflicts: ConflictDetector,
    pub scheduler: SmartScheduler,
    pub state: StateManager,
    pub renderer: Arc<dyn CommandRenderer>,
    pub events: broadcast::Sender<Event>,
}

/// Static orchestrator settings.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Override the generated session id (tests, snapshots)
    pub session_id: Option<String>,
}

/// Result of submitting a task: the stored record plus any conflicts found
/// by the pre-check. Error-severity conflicts keep the task out of dispatch
/// until they clear; warnings ride along informationally.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub task: Task,
    pub conflicts: Vec<Conflict>,
}

/// How to reach a worker's session from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInfo {
    pub worker_id: WorkerId,
    pub descriptive_name: String,
    pub attachment: Attachment,
}

/// What one dispatch tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub unblocked: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
}

struct SessionMeta {
    id: String,
    start_time: DateTime<Utc>,
    metadata: Map<String, Value>,
}

pub struct Orchestrator<S: SessionAdapter, G: IdGen, C: Clock> {
    clock: C,
    ids: G,
    graph: Mutex<TaskGraph>,
    workers: WorkerManager<S, G>,
    conflicts: Mutex<ConflictDetector>,
    scheduler: Mutex<SmartScheduler>,
    deadlines: Mutex<DeadlineTracker>,
    state: Mutex<StateManager>,
    renderer: Arc<dyn CommandRenderer>,
    events: broadcast::Sender<Event>,
    session: Mutex<SessionMeta>,
}

impl<S: SessionAdapter, G: IdGen, C: Clock> Orchestrator<S, G, C> {
    /// Build the orchestrator, loading a prior session from disk when one
    /// exists. Workers that were live at the last shutdown come back
    /// `stopped` and their running tasks re-enter `pending`.
    pub fn new(
        deps: OrchestratorDeps<S, G, C>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        let loaded = deps.state.load()?;

        let meta = SessionMeta {
            id: config
                .session_id
                .or_else(|| loaded.as_ref().map(|s| s.id.clone()))
                .unwrap_or_else(|| deps.ids.next()),
            start_time: loaded
                .as_ref()
                .map(|s| s.start_time)
                .unwrap_or_else(|| epoch_dt(deps.clock.epoch_ms())),
            metadata: loaded
                .as_ref()
                .map(|s| s.metadata.clone())
                .unwrap_or_default(),
        };

        let orchestrator = Self {
            clock: deps.clock,
            ids: deps.ids,
            graph: Mutex::new(TaskGraph::new()),
            workers: deps.workers,
            conflicts: Mutex::new(deps.conflicts),
            scheduler: Mutex::new(deps.scheduler),
            deadlines: Mutex::new(DeadlineTracker::new()),
            state: Mutex::new(deps.state),
            renderer: deps.renderer,
            events: deps.events,
            session: Mutex::new(meta),
        };

        if let Some(session) = loaded {
            info!(
                session = %session.id,
                tasks = session.tasks.len(),
                workers = session.workers.len(),
                "restored session from disk"
            );
            orchestrator.install_records(session.tasks, session.workers);
        }

        Ok(orchestrator)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn session_id(&self) -> String {
        self.session.lock().id.clone()
    }

    // -- public API ---------------------------------------------------------

    /// Validate and record a task. Cycles reject the submission outright;
    /// resource conflicts are reported but leave the task pending.
    pub fn submit_task(&self, spec: TaskSpec) -> Result<SubmitOutcome, OrchestratorError> {
        let epoch_ms = self.clock.epoch_ms();
        let id = TaskId::new(self.ids.next());
        let task = Task::new(id.clone(), spec, epoch_ms);

        let estimate = { self.scheduler.lock().estimate(task.task_type) };
        let conflicts = {
            let mut graph = self.graph.lock();
            graph.add_task(task.clone())?;
            let detector = self.conflicts.lock();
            detector.check(&task, &estimate, &graph)
        };

        if let Some(deadline) = task.deadline_ms {
            self.deadlines.lock().set(id.clone(), deadline);
        }
        self.state.lock().mark_dirty();
        let _ = self.events.send(Event::TaskUpdate { task: task.clone() });
        debug!(task = %id, conflicts = conflicts.len(), "task submitted");
        Ok(SubmitOutcome { task, conflicts })
    }

    /// Manually spawn an idle worker of the given type.
    pub async fn spawn_worker(
        &self,
        worker_type: gaffer_core::TaskType,
        capabilities: BTreeSet<String>,
    ) -> Result<Worker, OrchestratorError> {
        let command = self.renderer.idle_command(worker_type);
        let worker = self
            .workers
            .spawn(
                worker_type,
                capabilities,
                &command,
                &[],
                self.clock.epoch_ms(),
            )
            .await?;
        self.state.lock().mark_dirty();
        Ok(worker)
    }

    pub fn list_workers(&self) -> Vec<Worker> {
        self.workers.list()
    }

    pub fn get_worker(&self, query: &str) -> Result<Worker, OrchestratorError> {
        self.workers
            .find(query)
            .ok_or_else(|| OrchestratorError::NotFound(query.to_string()))
    }

    pub fn connect_info(&self, query: &str) -> Result<ConnectInfo, OrchestratorError> {
        let worker = self.get_worker(query)?;
        Ok(ConnectInfo {
            worker_id: worker.id,
            descriptive_name: worker.descriptive_name,
            attachment: worker.attachment,
        })
    }

    pub async fn pause_worker(&self, query: &str) -> Result<Worker, OrchestratorError> {
        let worker = self.get_worker(query)?;
        let paused = self.workers.pause(&worker.id, self.clock.epoch_ms()).await?;
        self.state.lock().mark_dirty();
        Ok(paused)
    }

    pub async fn resume_worker(&self, query: &str) -> Result<Worker, OrchestratorError> {
        let worker = self.get_worker(query)?;
        let resumed = self
            .workers
            .resume(&worker.id, self.clock.epoch_ms())
            .await?;
        self.state.lock().mark_dirty();
        Ok(resumed)
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.graph.lock().tasks().cloned().collect()
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Task, OrchestratorError> {
        self.graph
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))
    }

    pub fn counts(&self) -> StatusCounts {
        self.graph.lock().counts()
    }

    /// Assemble the live session for persistence or the wire.
    pub fn get_session_data(&self) -> SessionData {
        let meta = self.session.lock();
        SessionData {
            id: meta.id.clone(),
            start_time: meta.start_time,
            last_update: epoch_dt(self.clock.epoch_ms()),
            tasks: self.graph.lock().tasks().cloned().collect(),
            workers: self.workers.list(),
            metadata: meta.metadata.clone(),
        }
    }

    /// Merge client-supplied session data (metadata keys) and save.
    ///
    /// A failed write emits `state.saveError` and does not fail the caller;
    /// the next autosave retries.
    pub fn save_session_data(&self, data: Value) -> bool {
        if let Some(metadata) = data.get("metadata").and_then(Value::as_object) {
            let mut meta = self.session.lock();
            for (key, value) in metadata {
                meta.metadata.insert(key.clone(), value.clone());
            }
        }
        self.state.lock().mark_dirty();
        self.persist(true)
    }

    /// Write-if-dirty, for the autosave timer.
    pub fn autosave(&self) -> bool {
        self.persist(false)
    }

    pub fn create_snapshot(&self, name: Option<&str>) -> Result<PathBuf, OrchestratorError> {
        let session = self.get_session_data();
        let path = self
            .state
            .lock()
            .create_snapshot(name, &session, self.clock.epoch_ms())?;
        Ok(path)
    }

    /// Replace the live session with a named snapshot. The previous session
    /// is preserved as `before_restore`. Restored workers have no live
    /// process behind them, so they come back the same way a cold start
    /// brings them back: stopped, with their tasks re-pending.
    pub async fn restore_snapshot(&self, path: &Path) -> Result<(), OrchestratorError> {
        // Stop whatever is still running before the state swap
        for worker in self.workers.list() {
            if worker.status.is_live() {
                let _ = self.workers.stop(&worker.id, self.clock.epoch_ms()).await;
            }
        }

        let current = self.get_session_data();
        let restored = {
            let mut state = self.state.lock();
            state.restore_snapshot(path, &current, self.clock.epoch_ms())?
        };

        {
            let mut meta = self.session.lock();
            meta.id = restored.id.clone();
            meta.start_time = restored.start_time;
            meta.metadata = restored.metadata.clone();
        }
        {
            let mut graph = self.graph.lock();
            *graph = TaskGraph::new();
        }
        self.conflicts.lock().reset();
        {
            let mut deadlines = self.deadlines.lock();
            *deadlines = DeadlineTracker::new();
        }
        self.workers.replace_all(Vec::new());
        self.install_records(restored.tasks, restored.workers);

        let _ = self.events.send(Event::InitialState {
            session: self.get_session_data(),
        });
        Ok(())
    }

    /// Final flush on graceful shutdown. Worker sessions are left to their
    /// own lives; a restart adopts them as orphans.
    pub fn shutdown(&self) -> bool {
        info!("orchestrator shutting down");
        self.persist(true)
    }

    // -- dispatch tick ------------------------------------------------------

    /// One iteration of the dispatch loop.
    pub async fn tick(&self) -> TickReport {
        let epoch_ms = self.clock.epoch_ms();
        let mut report = TickReport::default();

        // Blocked tasks whose failed dependency has been replaced recover
        let unblocked: Vec<Task> = {
            let mut graph = self.graph.lock();
            let ids = graph.revisit_blocked(epoch_ms);
            ids.iter().filter_map(|id| graph.get(id).cloned()).collect()
        };
        report.unblocked = unblocked.len();
        for task in &unblocked {
            let _ = self.events.send(Event::TaskUpdate { task: task.clone() });
        }
        if !unblocked.is_empty() {
            self.state.lock().mark_dirty();
        }

        // Deadline expiry: pause-then-kill the owning worker, fail the task
        let expired = { self.deadlines.lock().expired(epoch_ms) };
        for task_id in expired {
            let owner = {
                let graph = self.graph.lock();
                graph
                    .get(&task_id)
                    .filter(|t| t.status == TaskStatus::Running)
                    .and_then(|t| t.assigned_worker.clone())
            };
            let Some(worker_id) = owner else { continue };
            warn!(task = %task_id, worker = %worker_id, "deadline expired");
            let _ = self.workers.pause(&worker_id, epoch_ms).await;
            let _ = self.workers.stop(&worker_id, epoch_ms).await;
            self.finish_task(&task_id, Some("deadline expired".to_string()), None);
            report.failed += 1;
        }

        // Worker exits resolve their tasks
        for exit in self.workers.watch_exits(epoch_ms).await {
            let peak = self.workers.get(&exit.worker_id).map(|w| w.resources);
            let error = match exit.exit_code {
                Some(0) => None,
                Some(code) => Some(format!("exit code: {code}")),
                None => Some("session terminated unexpectedly".to_string()),
            };
            match &error {
                None => report.completed += 1,
                Some(_) => report.failed += 1,
            }
            self.finish_task(&exit.task_id, error, peak);
        }

        // Gather dispatch candidates
        let (candidates, pending, running) = {
            let graph = self.graph.lock();
            let candidates: Vec<Task> = graph
                .executable_tasks()
                .into_iter()
                .cloned()
                .collect();
            let pending: Vec<Task> = graph
                .tasks()
                .filter(|t| t.status == TaskStatus::Pending)
                .cloned()
                .collect();
            let running: Vec<Task> = graph
                .tasks()
                .filter(|t| t.status == TaskStatus::Running)
                .cloned()
                .collect();
            (candidates, pending, running)
        };

        // Conflict clearance
        let mut cleared = Vec::new();
        for task in candidates {
            let estimate = { self.scheduler.lock().estimate(task.task_type) };
            let conflicts = {
                let graph = self.graph.lock();
                self.conflicts.lock().check(&task, &estimate, &graph)
            };
            if conflicts.iter().any(Conflict::is_error) {
                debug!(task = %task.id, "held back by conflicts");
                continue;
            }
            cleared.push(task);
        }

        // Rank and admit within the capacity envelope
        let decisions = {
            self.scheduler
                .lock()
                .plan(&cleared, &pending, &running, epoch_ms)
        };
        for decision in decisions {
            match self.dispatch(&decision, epoch_ms).await {
                Ok(()) => report.dispatched += 1,
                Err(e) => warn!(task = %decision.task_id, error = %e, "dispatch failed"),
            }
        }

        report
    }

    /// Update resource samples for live workers (poller entry point).
    pub async fn poll_resources(&self) {
        self.workers.poll_resources().await;
    }

    // -- internals ----------------------------------------------------------

    async fn dispatch(
        &self,
        decision: &SchedulingDecision,
        epoch_ms: u64,
    ) -> Result<(), OrchestratorError> {
        let task = self
            .graph
            .lock()
            .get(&decision.task_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(decision.task_id.to_string()))?;
        if task.status != TaskStatus::Pending {
            return Ok(());
        }

        let command = match self.renderer.build_command(&task) {
            Ok(command) => command,
            Err(e) => {
                // Renderer failure fails the task; no worker is touched
                self.finish_task(&task.id, Some(e.to_string()), None);
                return Err(OrchestratorError::Dispatch(e.to_string()));
            }
        };

        // Reserve before dispatch so parallel claims cannot interleave
        let estimate = Estimate {
            cpu_percent: decision.cpu_percent,
            memory_mb: decision.memory_mb,
            duration_ms: decision.estimated_duration_ms,
        };
        {
            let mut conflicts = self.conflicts.lock();
            let claims = conflicts.extract_claims(&task);
            conflicts
                .allocate(&task.id, &claims, &estimate)
                .map_err(|c| OrchestratorError::Conflict(vec![c]))?;
        }

        let required = task_capabilities(&task);
        let assigned = match self.workers.find_idle(task.task_type, &required) {
            Some(worker_id) => {
                // Injected commands end the session so the exit is observable
                let injected = format!("{command}; exit $?");
                self.workers
                    .assign(&worker_id, &task.id, &injected, epoch_ms)
                    .await
                    .map(|()| worker_id)
            }
            None => {
                let spawned = self
                    .workers
                    .spawn(task.task_type, required, &command, &[], epoch_ms)
                    .await;
                spawned.map(|worker| {
                    self.workers.attach_task(&worker.id, &task.id, epoch_ms);
                    worker.id
                })
            }
        };

        let worker_id = match assigned {
            Ok(worker_id) => worker_id,
            Err(e) => {
                // Task stays pending; free the reservation for the next tick
                self.conflicts.lock().release(&task.id);
                return Err(e);
            }
        };

        let worker_name = self
            .workers
            .get(&worker_id)
            .map(|w| w.descriptive_name)
            .unwrap_or_default();

        let updated = {
            let mut graph = self.graph.lock();
            if let Some(t) = graph.get_mut(&task.id) {
                t.mark_running(worker_id.clone(), worker_name, command, epoch_ms);
                t.clone()
            } else {
                return Err(OrchestratorError::NotFound(task.id.to_string()));
            }
        };
        self.state.lock().mark_dirty();
        let _ = self.events.send(Event::TaskUpdate { task: updated });
        info!(task = %task.id, worker = %worker_id, "task dispatched");
        Ok(())
    }

    /// Resolve a task terminally: release reservations, record the learning
    /// sample, cascade blocks, persist, and broadcast.
    fn finish_task(
        &self,
        task_id: &TaskId,
        error: Option<String>,
        peak: Option<gaffer_core::ResourceUsage>,
    ) {
        let epoch_ms = self.clock.epoch_ms();
        self.conflicts.lock().release(task_id);
        self.deadlines.lock().cancel(task_id);

        let success = error.is_none();
        let (finished, blocked, started_ms) = {
            let mut graph = self.graph.lock();
            let started_ms = graph.get(task_id).map(|t| t.updated_at_ms).unwrap_or(epoch_ms);
            let blocked = match &error {
                None => {
                    let _ = graph.mark_completed(task_id, epoch_ms);
                    Vec::new()
                }
                Some(message) => graph
                    .mark_failed(task_id, Some(message.clone()), epoch_ms)
                    .unwrap_or_default(),
            };
            let finished = graph.get(task_id).cloned();
            let blocked: Vec<Task> = blocked
                .iter()
                .filter_map(|id| graph.get(id).cloned())
                .collect();
            (finished, blocked, started_ms)
        };

        let Some(finished) = finished else { return };

        {
            let mut scheduler = self.scheduler.lock();
            scheduler.record(TaskOutcome {
                task_type: finished.task_type,
                duration_ms: epoch_ms.saturating_sub(started_ms),
                success,
                cpu_peak: peak.map(|p| p.cpu_percent).unwrap_or(0.0),
                memory_peak: peak.map(|p| p.memory_mb).unwrap_or(0.0),
            });
        }

        let _ = self.events.send(Event::TaskUpdate {
            task: finished.clone(),
        });
        match error {
            None => {
                let _ = self.events.send(Event::TaskCompleted {
                    task_id: task_id.clone(),
                });
            }
            Some(message) => {
                let _ = self.events.send(Event::TaskFailed {
                    task_id: task_id.clone(),
                    error: message,
                });
            }
        }
        for task in blocked {
            let _ = self.events.send(Event::TaskUpdate { task });
        }

        // Terminal transitions force an immediate save
        self.state.lock().mark_dirty();
        self.persist(true);
    }

    /// Ingest tasks and workers from a loaded or restored session, running
    /// orphan recovery on both.
    fn install_records(&self, tasks: Vec<Task>, workers: Vec<Worker>) {
        let epoch_ms = self.clock.epoch_ms();
        {
            let mut graph = self.graph.lock();
            let mut deadlines = self.deadlines.lock();
            for mut task in tasks {
                if task.status == TaskStatus::Running {
                    // The worker behind it is gone; run it again
                    task.mark_pending(epoch_ms);
                }
                if !task.is_terminal() {
                    if let Some(deadline) = task.deadline_ms {
                        deadlines.set(task.id.clone(), deadline);
                    }
                }
                if let Err(e) = graph.add_task(task) {
                    warn!(error = %e, "skipping persisted task");
                }
            }
        }
        for mut worker in workers {
            if worker.status.is_live() {
                worker.status = WorkerStatus::Stopped;
                worker.quick_access_key = None;
                worker.current_task = None;
            }
            self.workers.adopt(worker);
        }
        self.state.lock().mark_dirty();
    }

    /// Persist the session; `true` means the state on disk is current.
    /// Failures are reported as events, never surfaced to callers.
    fn persist(&self, force: bool) -> bool {
        let session = self.get_session_data();
        let mut state = self.state.lock();
        let result = if force {
            state.save(&session).map(Some)
        } else {
            state.save_if_dirty(&session)
        };
        match result {
            Ok(Some(path)) => {
                let _ = self.events.send(Event::StateSaved { path });
                true
            }
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "state write failed");
                let _ = self.events.send(Event::SaveError {
                    message: e.to_string(),
                });
                false
            }
        }
    }
}

fn task_capabilities(task: &Task) -> BTreeSet<String> {
    task.parameters
        .extra
        .get("capabilities")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn epoch_dt(epoch_ms: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
