// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict detection and resource reservation.
//!
//! Before dispatch, a task's resource claims (files, ports, services) are
//! derived from its parameters merged with description heuristics and
//! matched against the live reservation tables. At dispatch the claims are
//! reserved; at task termination they are released exactly once.

use crate::graph::TaskGraph;
use crate::scheduler::Estimate;
use gaffer_core::{Task, TaskId, TaskStatus};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

/// Service names the description extractor recognizes.
const SERVICE_VOCABULARY: [&str; 8] = [
    "redis",
    "postgres",
    "mysql",
    "mongodb",
    "elasticsearch",
    "rabbitmq",
    "kafka",
    "sqlite",
];

#[allow(clippy::expect_used)]
static FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\w./-]+\.\w{1,8}").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static PORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:port|listen|bind)\D{0,10}?(\d{1,5})\b")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static WRITE_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(write|modify|update|create|delete|save|edit|append)\b")
        .expect("constant regex pattern is valid")
});

/// What a conflict is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    File,
    Port,
    Service,
    Dependency,
    ResourceCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Dispatch proceeds; the warning rides along in the response
    Warning,
    /// Dispatch is refused until the conflict clears
    Error,
}

/// One detected conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicting_task: Option<TaskId>,
    pub description: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl Conflict {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Resource claims derived for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSet {
    pub files: BTreeSet<String>,
    pub ports: BTreeSet<u16>,
    pub services: BTreeSet<String>,
    pub write_intent: bool,
}

impl ClaimSet {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.ports.is_empty() && self.services.is_empty()
    }
}

/// Reservation held by one task, kept as an inverse index so release is O(1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    pub files: BTreeSet<String>,
    pub ports: BTreeSet<u16>,
    pub services: BTreeSet<String>,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

/// Limits and service capacities.
#[derive(Debug, Clone)]
pub struct ConflictConfig {
    pub max_cpu_percent: f64,
    pub max_memory_mb: f64,
    /// Services with capacity 1
    pub exclusive_services: BTreeSet<String>,
    pub default_service_capacity: usize,
    pub service_capacity: HashMap<String, usize>,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            max_cpu_percent: 80.0,
            max_memory_mb: 4096.0,
            exclusive_services: ["mysql", "postgres", "sqlite"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_service_capacity: 3,
            service_capacity: HashMap::new(),
        }
    }
}

/// Owns the reservation tables and produces pre-dispatch conflict reports.
#[derive(Debug, Default)]
pub struct ConflictDetector {
    config: ConflictConfig,
    files: HashMap<String, BTreeSet<TaskId>>,
    ports: HashMap<u16, TaskId>,
    services: HashMap<String, BTreeSet<TaskId>>,
    allocations: HashMap<TaskId, Allocation>,
}

impl ConflictDetector {
    pub fn new(config: ConflictConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Derive the claim set for a task: explicit parameters merged with
    /// description heuristics.
    pub fn extract_claims(&self, task: &Task) -> ClaimSet {
        let mut claims = ClaimSet {
            write_intent: WRITE_INTENT.is_match(&task.description),
            ..ClaimSet::default()
        };

        for file in &task.parameters.files {
            claims.files.insert(normalize_path(file));
        }
        claims.ports.extend(task.parameters.ports.iter().copied());
        for service in &task.parameters.services {
            claims.services.insert(service.to_lowercase());
        }

        for m in FILE_PATTERN.find_iter(&task.description) {
            claims.files.insert(normalize_path(m.as_str()));
        }
        for caps in PORT_PATTERN.captures_iter(&task.description) {
            if let Some(port) = caps.get(1).and_then(|m| m.as_str().parse::<u16>().ok()) {
                if port > 0 {
                    claims.ports.insert(port);
                }
            }
        }
        let lowered = task.description.to_lowercase();
        for service in SERVICE_VOCABULARY {
            if lowered.contains(service) {
                claims.services.insert(service.to_string());
            }
        }

        claims
    }

    /// Pre-dispatch check: claims against reservations, dependencies against
    /// the graph, and resource estimates against configured limits.
    pub fn check(&self, task: &Task, estimate: &Estimate, graph: &TaskGraph) -> Vec<Conflict> {
        let claims = self.extract_claims(task);
        let mut conflicts = Vec::new();

        for file in &claims.files {
            if let Some(holders) = self.files.get(file) {
                if let Some(holder) = holders.iter().find(|h| **h != task.id) {
                    let severity = if claims.write_intent {
                        Severity::Error
                    } else {
                        Severity::Warning
                    };
                    conflicts.push(Conflict {
                        kind: ConflictKind::File,
                        conflicting_task: Some(holder.clone()),
                        description: format!("file {file} is claimed by task {holder}"),
                        severity,
                        resolution: Some("wait for the holding task to finish".to_string()),
                    });
                }
            }
        }

        for port in &claims.ports {
            if let Some(holder) = self.ports.get(port) {
                if *holder != task.id {
                    conflicts.push(Conflict {
                        kind: ConflictKind::Port,
                        conflicting_task: Some(holder.clone()),
                        description: format!("port {port} is reserved by task {holder}"),
                        severity: Severity::Error,
                        resolution: Some("use a different port or wait".to_string()),
                    });
                }
            }
        }

        for service in &claims.services {
            let holders = self.services.get(service);
            let holder_count = holders.map(|h| h.len()).unwrap_or(0);
            if holder_count == 0 {
                continue;
            }
            let first_holder = holders.and_then(|h| h.iter().next()).cloned();
            if self.config.exclusive_services.contains(service) {
                conflicts.push(Conflict {
                    kind: ConflictKind::Service,
                    conflicting_task: first_holder,
                    description: format!("exclusive service {service} is already in use"),
                    severity: Severity::Error,
                    resolution: Some("wait for the holding task to finish".to_string()),
                });
            } else if holder_count >= self.service_capacity(service) {
                conflicts.push(Conflict {
                    kind: ConflictKind::Service,
                    conflicting_task: first_holder,
                    description: format!(
                        "service {service} is at capacity ({holder_count} users)"
                    ),
                    severity: Severity::Warning,
                    resolution: None,
                });
            }
        }

        for dep in &task.dependencies {
            match graph.get(dep) {
                None => conflicts.push(Conflict {
                    kind: ConflictKind::Dependency,
                    conflicting_task: Some(dep.clone()),
                    description: format!("dependency {dep} does not exist"),
                    severity: Severity::Error,
                    resolution: Some("submit the missing task".to_string()),
                }),
                Some(pred) if pred.status == TaskStatus::Failed => {
                    conflicts.push(Conflict {
                        kind: ConflictKind::Dependency,
                        conflicting_task: Some(dep.clone()),
                        description: format!("dependency {dep} failed"),
                        severity: Severity::Error,
                        resolution: Some("retry the failed dependency".to_string()),
                    });
                }
                Some(_) => {}
            }
        }

        let (cpu_reserved, memory_reserved) = self.reserved_totals();
        if cpu_reserved + estimate.cpu_percent > self.config.max_cpu_percent {
            conflicts.push(Conflict {
                kind: ConflictKind::ResourceCapacity,
                conflicting_task: None,
                description: format!(
                    "estimated cpu {:.0}% would exceed the {:.0}% limit",
                    cpu_reserved + estimate.cpu_percent,
                    self.config.max_cpu_percent
                ),
                severity: Severity::Warning,
                resolution: None,
            });
        }
        if memory_reserved + estimate.memory_mb > self.config.max_memory_mb {
            conflicts.push(Conflict {
                kind: ConflictKind::ResourceCapacity,
                conflicting_task: None,
                description: format!(
                    "estimated memory {:.0}MB would exceed the {:.0}MB limit",
                    memory_reserved + estimate.memory_mb,
                    self.config.max_memory_mb
                ),
                severity: Severity::Warning,
                resolution: None,
            });
        }

        conflicts
    }

    /// Reserve a task's claims. Idempotent: re-allocating an already-held
    /// task is a no-op. Never partially applies — exclusivity violations
    /// fail before any table is touched.
    pub fn allocate(
        &mut self,
        task_id: &TaskId,
        claims: &ClaimSet,
        estimate: &Estimate,
    ) -> Result<(), Conflict> {
        if self.allocations.contains_key(task_id) {
            return Ok(());
        }

        // Validate exclusivity up front
        for port in &claims.ports {
            if let Some(holder) = self.ports.get(port) {
                if holder != task_id {
                    return Err(Conflict {
                        kind: ConflictKind::Port,
                        conflicting_task: Some(holder.clone()),
                        description: format!("port {port} is reserved by task {holder}"),
                        severity: Severity::Error,
                        resolution: None,
                    });
                }
            }
        }
        for service in &claims.services {
            if self.config.exclusive_services.contains(service) {
                if let Some(holders) = self.services.get(service) {
                    if let Some(holder) = holders.iter().find(|h| *h != task_id) {
                        return Err(Conflict {
                            kind: ConflictKind::Service,
                            conflicting_task: Some(holder.clone()),
                            description: format!("exclusive service {service} is already in use"),
                            severity: Severity::Error,
                            resolution: None,
                        });
                    }
                }
            }
        }

        for file in &claims.files {
            self.files
                .entry(file.clone())
                .or_default()
                .insert(task_id.clone());
        }
        for port in &claims.ports {
            self.ports.insert(*port, task_id.clone());
        }
        for service in &claims.services {
            self.services
                .entry(service.clone())
                .or_default()
                .insert(task_id.clone());
        }
        self.allocations.insert(
            task_id.clone(),
            Allocation {
                files: claims.files.clone(),
                ports: claims.ports.clone(),
                services: claims.services.clone(),
                cpu_percent: estimate.cpu_percent,
                memory_mb: estimate.memory_mb,
            },
        );
        Ok(())
    }

    /// Release a task's reservation. Idempotent.
    pub fn release(&mut self, task_id: &TaskId) {
        let Some(allocation) = self.allocations.remove(task_id) else {
            return;
        };
        for file in &allocation.files {
            if let Some(holders) = self.files.get_mut(file) {
                holders.remove(task_id);
                if holders.is_empty() {
                    self.files.remove(file);
                }
            }
        }
        for port in &allocation.ports {
            if self.ports.get(port) == Some(task_id) {
                self.ports.remove(port);
            }
        }
        for service in &allocation.services {
            if let Some(holders) = self.services.get_mut(service) {
                holders.remove(task_id);
                if holders.is_empty() {
                    self.services.remove(service);
                }
            }
        }
    }

    pub fn allocation(&self, task_id: &TaskId) -> Option<&Allocation> {
        self.allocations.get(task_id)
    }

    /// Drop every reservation, keeping the configuration (session restore).
    pub fn reset(&mut self) {
        self.files.clear();
        self.ports.clear();
        self.services.clear();
        self.allocations.clear();
    }

    /// True when every table is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
            && self.ports.is_empty()
            && self.services.is_empty()
            && self.allocations.is_empty()
    }

    fn service_capacity(&self, service: &str) -> usize {
        self.config
            .service_capacity
            .get(service)
            .copied()
            .unwrap_or(self.config.default_service_capacity)
    }

    fn reserved_totals(&self) -> (f64, f64) {
        let cpu = self.allocations.values().map(|a| a.cpu_percent).sum();
        let memory = self.allocations.values().map(|a| a.memory_mb).sum();
        (cpu, memory)
    }
}

/// Strip a leading `./` so the same path spelled two ways collides.
fn normalize_path(path: &str) -> String {
    path.strip_prefix("./").unwrap_or(path).to_string()
}

#[cfg(test)]
#[path = "conflict_tests.rs"]
mod tests;
