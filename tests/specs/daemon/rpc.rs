//! RPC surface over a live TCP connection.

use crate::prelude::*;
use serde_json::json;

#[test]
fn initial_state_arrives_on_connect() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::boot(dir.path());

    let (_stream, initial) = daemon.connect();
    let session = &initial["params"]["session"];
    assert!(session["id"].is_string());
    assert_eq!(session["tasks"], json!([]));
    assert_eq!(session["workers"], json!([]));
}

#[test]
fn capabilities_and_tools_list() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::boot(dir.path());
    let (mut stream, _) = daemon.connect();

    let response = call(&mut stream, 1, "capabilities", json!({}));
    assert_eq!(response["result"]["serverInfo"]["name"], "gafferd");

    let response = call(&mut stream, 2, "tools/list", json!({}));
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    for tool in [
        "submit_task",
        "list_workers",
        "connect_worker",
        "pause_worker",
        "resume_worker",
        "get_session",
        "save_session",
    ] {
        assert!(names.contains(&tool), "missing tool {tool}");
    }
}

#[test]
fn unknown_method_and_tool_error_with_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::boot(dir.path());
    let (mut stream, _) = daemon.connect();

    let response = call(&mut stream, 1, "no/such/method", json!({}));
    assert_eq!(response["error"]["code"], -32601);

    let response = call_tool(&mut stream, 2, "no_such_tool", json!({}));
    assert_eq!(response["error"]["code"], -32601);
}

#[test]
fn invalid_tool_params_error() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::boot(dir.path());
    let (mut stream, _) = daemon.connect();

    let response = call_tool(&mut stream, 1, "submit_task", json!({"type": "code"}));
    assert_eq!(response["error"]["code"], -32602);
}

#[test]
fn submitted_task_shows_up_in_session() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::boot(dir.path());
    let (mut stream, _) = daemon.connect();

    let response = call_tool(
        &mut stream,
        1,
        "submit_task",
        json!({"type": "research", "description": "map the crate ecosystem", "priority": 3}),
    );
    let task_id = response["result"]["taskId"].as_str().unwrap().to_string();
    assert_eq!(response["result"]["status"], "submitted");

    let response = call_tool(&mut stream, 2, "get_session", json!({}));
    let tasks = response["result"]["tasks"].as_array().unwrap();
    assert!(tasks.iter().any(|t| t["id"] == json!(task_id)));
}

#[test]
fn task_events_are_pushed_to_clients() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::boot(dir.path());
    let (mut stream, _) = daemon.connect();

    write_frame(
        &mut stream,
        &json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {
            "name": "submit_task",
            "arguments": {"type": "code", "description": "observable work"},
        }}),
    );

    // Both the response and a task.update notification arrive; order between
    // them is not fixed, so scan a few frames.
    let mut saw_response = false;
    let mut saw_update = false;
    for _ in 0..10 {
        let frame = read_frame(&mut stream);
        if frame.get("id") == Some(&json!(1)) {
            saw_response = true;
        }
        if frame.get("method") == Some(&json!("task.update")) {
            saw_update = true;
        }
        if saw_response && saw_update {
            break;
        }
    }
    assert!(saw_response, "no response to submit_task");
    assert!(saw_update, "no task.update notification");
}
