//! State survives a daemon restart.

use crate::prelude::*;
use serde_json::json;

#[test]
fn tasks_reload_with_identical_ids_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let submitted: Vec<String> = {
        let daemon = Daemon::boot(dir.path());
        let (mut stream, _) = daemon.connect();

        let ids = (0..5)
            .map(|i| {
                let response = call_tool(
                    &mut stream,
                    i + 1,
                    "submit_task",
                    json!({
                        "type": "analysis",
                        "description": format!("inspect module {i}"),
                        "priority": i,
                    }),
                );
                response["result"]["taskId"].as_str().unwrap().to_string()
            })
            .collect();

        daemon.terminate();
        ids
    };
    assert!(dir.path().join("state.json").exists());

    // Same data dir, fresh process
    let daemon = Daemon::boot(dir.path());
    let (mut stream, initial) = daemon.connect();

    let session = &initial["params"]["session"];
    let tasks = session["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 5);
    for id in &submitted {
        let task = tasks
            .iter()
            .find(|t| t["id"] == json!(id))
            .unwrap_or_else(|| panic!("task {id} was lost"));
        assert_eq!(task["type"], "analysis");
        // Nothing stays `running` across a restart
        assert_ne!(task["status"], "running");
    }

    // Any worker that survived in the snapshot is an orphan now
    for worker in session["workers"].as_array().unwrap() {
        assert!(worker["status"] == "stopped" || worker["status"] == "error");
    }

    // The reloaded session still answers queries
    let response = call_tool(&mut stream, 99, "get_session", json!({}));
    assert_eq!(
        response["result"]["tasks"].as_array().unwrap().len(),
        5
    );
}

#[test]
fn session_id_is_stable_across_restarts() {
    let dir = tempfile::tempdir().unwrap();

    let first_id = {
        let daemon = Daemon::boot(dir.path());
        let (_stream, initial) = daemon.connect();
        let id = initial["params"]["session"]["id"]
            .as_str()
            .unwrap()
            .to_string();
        daemon.terminate();
        id
    };

    let daemon = Daemon::boot(dir.path());
    let (_stream, initial) = daemon.connect();
    assert_eq!(initial["params"]["session"]["id"], json!(first_id));
    drop(daemon);
}
