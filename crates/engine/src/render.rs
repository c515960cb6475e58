// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seams to the external command renderer and worker namer.
//!
//! The AI/CLI wrapper that turns a task description into a concrete shell
//! command lives outside the core; the orchestrator only sees
//! [`CommandRenderer`]. Likewise worker names come from a [`NameGenerator`].
//! The default implementations here are deliberately small stand-ins.

use gaffer_core::{Task, TaskType};
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use thiserror::Error;

/// Rendering failed; the task cannot be dispatched.
#[derive(Debug, Error)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

/// External seam: `task → shell command`. Invoked just before dispatch.
pub trait CommandRenderer: Send + Sync {
    fn build_command(&self, task: &Task) -> Result<String, RenderError>;

    /// Command a manually spawned worker idles in until a task is injected.
    fn idle_command(&self, _worker_type: TaskType) -> String {
        "sh".to_string()
    }
}

/// External seam: `task type → descriptive worker name`.
pub trait NameGenerator: Send + Sync {
    fn generate(&self, task_type: TaskType) -> String;
}

/// Default renderer: hands the task description to a per-type program as a
/// single quoted argument.
pub struct ShellRenderer {
    programs: HashMap<TaskType, String>,
}

impl ShellRenderer {
    pub fn new() -> Self {
        Self {
            programs: HashMap::new(),
        }
    }

    /// Override the program for one task type.
    pub fn with_program(mut self, task_type: TaskType, program: impl Into<String>) -> Self {
        self.programs.insert(task_type, program.into());
        self
    }

    fn program_for(&self, task_type: TaskType) -> &str {
        self.programs
            .get(&task_type)
            .map(String::as_str)
            .unwrap_or("echo")
    }
}

impl Default for ShellRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRenderer for ShellRenderer {
    fn build_command(&self, task: &Task) -> Result<String, RenderError> {
        if task.description.trim().is_empty() {
            return Err(RenderError(format!(
                "task {} has an empty description",
                task.id
            )));
        }
        let program = self.program_for(task.task_type);
        let payload = escape_for_shell_double_quotes(&format!(
            "{}: {}",
            task.task_type, task.description
        ));
        Ok(format!("{program} \"{payload}\""))
    }
}

/// Escape characters that have special meaning in shell double-quoted strings.
///
/// When a description is embedded in a command like `tool "${text}"`,
/// backticks and dollar signs would be interpreted by the shell. This
/// function escapes them so they're treated literally.
fn escape_for_shell_double_quotes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '`' => result.push_str("\\`"),
            '$' => result.push_str("\\$"),
            '"' => result.push_str("\\\""),
            _ => result.push(c),
        }
    }
    result
}

const ADJECTIVES: [&str; 20] = [
    "amber", "brisk", "calm", "daring", "eager", "fleet", "gentle", "hardy", "keen", "lively",
    "mellow", "nimble", "patient", "quick", "rustic", "steady", "tidy", "vivid", "wry", "zesty",
];

const NOUNS: [&str; 20] = [
    "otter", "heron", "badger", "lynx", "falcon", "marten", "osprey", "puffin", "raven", "stoat",
    "swift", "tern", "vole", "wren", "ibex", "jay", "kite", "loon", "mole", "newt",
];

/// Default namer: adjective-noun callsigns like `brisk-otter`.
#[derive(Clone, Default)]
pub struct CallsignGenerator;

impl CallsignGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl NameGenerator for CallsignGenerator {
    fn generate(&self, _task_type: TaskType) -> String {
        let mut rng = rand::rng();
        let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"plain");
        let noun = NOUNS.choose(&mut rng).unwrap_or(&"worker");
        format!("{adjective}-{noun}")
    }
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
