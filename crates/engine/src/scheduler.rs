// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-strategy task scoring and capacity-filtered dispatch planning.
//!
//! Each strategy scores a task independently; the final score is the sum and
//! the dominant strategy (the argmax contributor) is kept for attribution.
//! A capacity filter then walks the ranked list and admits candidates that
//! fit within the configured CPU/memory/concurrency envelope.

use gaffer_core::{Task, TaskId, TaskType};
use serde::Serialize;
use std::collections::VecDeque;

/// Outcome samples retained for learning, FIFO-evicted.
pub const HISTORY_CAP: usize = 100;

/// Resource and duration estimate for one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub duration_ms: u64,
}

impl Estimate {
    /// Static per-type defaults, used until history accumulates.
    pub fn default_for(task_type: TaskType) -> Self {
        let (cpu_percent, memory_mb, minutes) = match task_type {
            TaskType::Research => (10.0, 256.0, 10),
            TaskType::Code => (25.0, 512.0, 20),
            TaskType::Test => (40.0, 768.0, 15),
            TaskType::Analysis => (20.0, 384.0, 12),
            TaskType::Swarm => (60.0, 1536.0, 30),
            TaskType::HiveMind => (70.0, 2048.0, 45),
        };
        Self {
            cpu_percent,
            memory_mb,
            duration_ms: minutes * 60_000,
        }
    }
}

/// Capacity envelope for admission.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub max_concurrent_tasks: usize,
    pub max_cpu_percent: f64,
    pub max_memory_mb: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            max_cpu_percent: 80.0,
            max_memory_mb: 4096.0,
        }
    }
}

/// One terminal-task sample fed back for learning.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_type: TaskType,
    pub duration_ms: u64,
    pub success: bool,
    pub cpu_peak: f64,
    pub memory_peak: f64,
}

/// Which scorer dominated a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Priority,
    Dependency,
    Resource,
    Deadline,
    Learned,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Priority => "priority",
            StrategyKind::Dependency => "dependency",
            StrategyKind::Resource => "resource",
            StrategyKind::Deadline => "deadline",
            StrategyKind::Learned => "learned",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task admitted for dispatch this tick.
#[derive(Debug, Clone)]
pub struct SchedulingDecision {
    pub task_id: TaskId,
    pub score: i64,
    pub strategy: StrategyKind,
    pub estimated_duration_ms: u64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

struct ScoreCtx<'a> {
    pending: &'a [Task],
    available_cpu: f64,
    available_memory: f64,
    now_ms: u64,
    history: &'a VecDeque<TaskOutcome>,
}

trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;
    fn score(&self, task: &Task, estimate: &Estimate, ctx: &ScoreCtx<'_>) -> i64;
}

struct PriorityStrategy;

impl Strategy for PriorityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Priority
    }

    fn score(&self, task: &Task, _estimate: &Estimate, _ctx: &ScoreCtx<'_>) -> i64 {
        10 * task.priority
    }
}

struct DependencyStrategy;

impl Strategy for DependencyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Dependency
    }

    fn score(&self, task: &Task, _estimate: &Estimate, ctx: &ScoreCtx<'_>) -> i64 {
        let base = if task.dependencies.is_empty() { 50 } else { 0 };
        let waiting = ctx
            .pending
            .iter()
            .filter(|p| p.dependencies.contains(&task.id))
            .count() as i64;
        base + 15 * waiting
    }
}

struct ResourceStrategy;

impl Strategy for ResourceStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Resource
    }

    fn score(&self, _task: &Task, estimate: &Estimate, ctx: &ScoreCtx<'_>) -> i64 {
        if estimate.cpu_percent <= ctx.available_cpu && estimate.memory_mb <= ctx.available_memory
        {
            30
        } else {
            -10
        }
    }
}

struct DeadlineStrategy;

const HOUR_MS: u64 = 60 * 60 * 1000;

impl Strategy for DeadlineStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Deadline
    }

    fn score(&self, task: &Task, _estimate: &Estimate, ctx: &ScoreCtx<'_>) -> i64 {
        match task.deadline_ms {
            Some(deadline) => {
                let remaining = deadline.saturating_sub(ctx.now_ms);
                if remaining < HOUR_MS {
                    100
                } else if remaining < 24 * HOUR_MS {
                    50
                } else {
                    0
                }
            }
            None => 0,
        }
    }
}

struct LearnedStrategy;

impl Strategy for LearnedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Learned
    }

    fn score(&self, task: &Task, estimate: &Estimate, ctx: &ScoreCtx<'_>) -> i64 {
        let rate = success_rate(ctx.history, task.task_type);
        let minutes = (estimate.duration_ms / 60_000) as i64;
        (20.0 * rate) as i64 - minutes
    }
}

fn success_rate(history: &VecDeque<TaskOutcome>, task_type: TaskType) -> f64 {
    let samples: Vec<&TaskOutcome> = history
        .iter()
        .filter(|o| o.task_type == task_type)
        .collect();
    if samples.is_empty() {
        // New task types are not penalized
        return 1.0;
    }
    let successes = samples.iter().filter(|o| o.success).count();
    successes as f64 / samples.len() as f64
}

/// Scores pending tasks and emits an admission-ordered dispatch plan.
pub struct SmartScheduler {
    config: SchedulerConfig,
    strategies: Vec<Box<dyn Strategy>>,
    history: VecDeque<TaskOutcome>,
}

impl SmartScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            strategies: vec![
                Box::new(PriorityStrategy),
                Box::new(DependencyStrategy),
                Box::new(ResourceStrategy),
                Box::new(DeadlineStrategy),
                Box::new(LearnedStrategy),
            ],
            history: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Feed back one terminal-task outcome.
    pub fn record(&mut self, outcome: TaskOutcome) {
        if self.history.len() == HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(outcome);
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn success_rate(&self, task_type: TaskType) -> f64 {
        success_rate(&self.history, task_type)
    }

    /// Per-type estimate: static defaults overridden by historical means
    /// once samples of that type exist. Zero-valued peak samples (never
    /// polled) do not override the defaults.
    pub fn estimate(&self, task_type: TaskType) -> Estimate {
        let mut estimate = Estimate::default_for(task_type);
        let samples: Vec<&TaskOutcome> = self
            .history
            .iter()
            .filter(|o| o.task_type == task_type)
            .collect();
        if samples.is_empty() {
            return estimate;
        }

        let n = samples.len() as f64;
        let mean_duration =
            samples.iter().map(|o| o.duration_ms).sum::<u64>() / samples.len() as u64;
        let mean_cpu = samples.iter().map(|o| o.cpu_peak).sum::<f64>() / n;
        let mean_memory = samples.iter().map(|o| o.memory_peak).sum::<f64>() / n;

        estimate.duration_ms = mean_duration;
        if mean_cpu > 0.0 {
            estimate.cpu_percent = mean_cpu;
        }
        if mean_memory > 0.0 {
            estimate.memory_mb = mean_memory;
        }
        estimate
    }

    /// Rank `candidates` and admit those that fit the capacity envelope.
    ///
    /// `pending` is the full pending set (for dependent counting); `running`
    /// contributes its estimates to the consumed-capacity baseline.
    pub fn plan(
        &self,
        candidates: &[Task],
        pending: &[Task],
        running: &[Task],
        now_ms: u64,
    ) -> Vec<SchedulingDecision> {
        let running_cpu: f64 = running
            .iter()
            .map(|t| self.estimate(t.task_type).cpu_percent)
            .sum();
        let running_memory: f64 = running
            .iter()
            .map(|t| self.estimate(t.task_type).memory_mb)
            .sum();

        let ctx = ScoreCtx {
            pending,
            available_cpu: (self.config.max_cpu_percent - running_cpu).max(0.0),
            available_memory: (self.config.max_memory_mb - running_memory).max(0.0),
            now_ms,
            history: &self.history,
        };

        let mut scored: Vec<SchedulingDecision> = candidates
            .iter()
            .map(|task| self.score_task(task, &ctx))
            .collect();
        // Stable sort keeps candidate order among equal scores
        scored.sort_by_key(|d| std::cmp::Reverse(d.score));

        // Capacity filter: admit while the envelope holds
        let mut admitted = Vec::new();
        let mut cpu_used = running_cpu;
        let mut memory_used = running_memory;
        for decision in scored {
            if running.len() + admitted.len() >= self.config.max_concurrent_tasks {
                break;
            }
            if cpu_used + decision.cpu_percent > self.config.max_cpu_percent {
                continue;
            }
            if memory_used + decision.memory_mb > self.config.max_memory_mb {
                continue;
            }
            cpu_used += decision.cpu_percent;
            memory_used += decision.memory_mb;
            admitted.push(decision);
        }
        admitted
    }

    fn score_task(&self, task: &Task, ctx: &ScoreCtx<'_>) -> SchedulingDecision {
        let estimate = self.estimate(task.task_type);
        let mut total = 0;
        let mut dominant = StrategyKind::Priority;
        let mut best = i64::MIN;
        for strategy in &self.strategies {
            let score = strategy.score(task, &estimate, ctx);
            total += score;
            // Ties keep registration order
            if score > best {
                best = score;
                dominant = strategy.kind();
            }
        }
        SchedulingDecision {
            task_id: task.id.clone(),
            score: total,
            strategy: dominant,
            estimated_duration_ms: estimate.duration_ms,
            cpu_percent: estimate.cpu_percent,
            memory_mb: estimate.memory_mb,
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
