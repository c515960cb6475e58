// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gaffer_core::{TaskId, TaskSpec};

fn task(task_type: TaskType, description: &str) -> Task {
    Task::new(TaskId::new("t"), TaskSpec::new(task_type, description), 1)
}

#[test]
fn default_renderer_quotes_the_description() {
    let renderer = ShellRenderer::new();
    let cmd = renderer
        .build_command(&task(TaskType::Code, "fix the parser"))
        .unwrap();
    assert_eq!(cmd, "echo \"code: fix the parser\"");
}

#[test]
fn per_type_program_override() {
    let renderer = ShellRenderer::new().with_program(TaskType::Research, "research-tool");
    let cmd = renderer
        .build_command(&task(TaskType::Research, "survey crates"))
        .unwrap();
    assert!(cmd.starts_with("research-tool \""));

    // Other types keep the default
    let cmd = renderer
        .build_command(&task(TaskType::Code, "x"))
        .unwrap();
    assert!(cmd.starts_with("echo \""));
}

#[test]
fn shell_metacharacters_are_escaped() {
    let renderer = ShellRenderer::new();
    let cmd = renderer
        .build_command(&task(TaskType::Code, r#"say "hi" for $USER via `id`"#))
        .unwrap();
    assert_eq!(
        cmd,
        "echo \"code: say \\\"hi\\\" for \\$USER via \\`id\\`\""
    );
}

#[test]
fn empty_description_fails_to_render() {
    let renderer = ShellRenderer::new();
    assert!(renderer.build_command(&task(TaskType::Code, "   ")).is_err());
}

#[test]
fn idle_command_defaults_to_a_shell() {
    let renderer = ShellRenderer::new();
    assert_eq!(renderer.idle_command(TaskType::Code), "sh");
}

#[test]
fn callsigns_are_adjective_noun_pairs() {
    let namer = CallsignGenerator::new();
    for _ in 0..20 {
        let name = namer.generate(TaskType::Code);
        let mut parts = name.split('-');
        let adjective = parts.next().unwrap();
        let noun = parts.next().unwrap();
        assert!(parts.next().is_none());
        assert!(ADJECTIVES.contains(&adjective));
        assert!(NOUNS.contains(&noun));
    }
}
