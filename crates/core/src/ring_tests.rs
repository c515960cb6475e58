// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn push_evicts_oldest_at_capacity() {
    let mut ring = OutputRing::new(3);
    ring.push("a");
    ring.push("b");
    ring.push("c");
    ring.push("d");

    assert_eq!(ring.len(), 3);
    let lines: Vec<_> = ring.lines().collect();
    assert_eq!(lines, vec!["b", "c", "d"]);
}

#[test]
fn tail_returns_most_recent_oldest_first() {
    let mut ring = OutputRing::new(10);
    for i in 0..5 {
        ring.push(format!("line-{i}"));
    }
    assert_eq!(ring.tail(2), vec!["line-3", "line-4"]);
    assert_eq!(ring.tail(100).len(), 5);
}

#[test]
fn zero_capacity_is_clamped_to_one() {
    let mut ring = OutputRing::new(0);
    ring.push("a");
    ring.push("b");
    assert_eq!(ring.len(), 1);
    assert_eq!(ring.tail(1), vec!["b"]);
}

#[test]
fn serde_round_trips_as_plain_array() {
    let mut ring = OutputRing::new(4);
    ring.push("one");
    ring.push("two");

    let json = serde_json::to_string(&ring).unwrap();
    assert_eq!(json, r#"["one","two"]"#);

    let back: OutputRing = serde_json::from_str(&json).unwrap();
    let lines: Vec<_> = back.lines().collect();
    assert_eq!(lines, vec!["one", "two"]);
    // Capacity is not persisted; rehydrates to the default
    assert_eq!(back.capacity(), DEFAULT_OUTPUT_LINES);
}

#[test]
fn deserialize_truncates_beyond_default_capacity() {
    let lines: Vec<String> = (0..DEFAULT_OUTPUT_LINES + 10)
        .map(|i| format!("l{i}"))
        .collect();
    let json = serde_json::to_string(&lines).unwrap();
    let ring: OutputRing = serde_json::from_str(&json).unwrap();
    assert_eq!(ring.len(), DEFAULT_OUTPUT_LINES);
    assert_eq!(ring.tail(1), vec![format!("l{}", DEFAULT_OUTPUT_LINES + 9)]);
}
