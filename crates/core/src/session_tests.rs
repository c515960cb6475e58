// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::task::{TaskId, TaskSpec, TaskType};
use chrono::TimeZone;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
}

#[test]
fn snapshot_envelope_carries_version() {
    let snapshot = SessionSnapshot::new(SessionData::new("s-1", base_time()));
    assert_eq!(snapshot.version, SNAPSHOT_VERSION);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["version"], "1.0.0");
    assert_eq!(json["session"]["id"], "s-1");
}

#[test]
fn snapshot_round_trip_is_identity() {
    let mut session = SessionData::new("s-2", base_time());
    session.tasks.push(Task::new(
        TaskId::new("t-1"),
        TaskSpec::new(TaskType::Research, "survey crates"),
        42,
    ));
    session
        .metadata
        .insert("origin".to_string(), serde_json::json!("cli"));

    let snapshot = SessionSnapshot::new(session);
    let json = serde_json::to_string(&snapshot).unwrap();
    let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
}

#[test]
fn timestamps_serialize_as_iso8601() {
    let session = SessionData::new("s-3", base_time());
    let json = serde_json::to_value(&session).unwrap();
    let start = json["startTime"].as_str().unwrap();
    assert!(start.starts_with("2025-06-01T09:30:00"));
}

#[test]
fn missing_collections_default_to_empty() {
    let json = serde_json::json!({
        "id": "s-4",
        "startTime": "2025-06-01T09:30:00Z",
        "lastUpdate": "2025-06-01T09:30:00Z",
    });
    let session: SessionData = serde_json::from_value(json).unwrap();
    assert!(session.tasks.is_empty());
    assert!(session.workers.is_empty());
    assert!(session.metadata.is_empty());
}
