// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::rpc::INTERNAL_ERROR;
use crate::tools::{ToolDef, ToolError};
use gaffer_adapters::FakeSessionAdapter;
use gaffer_core::{FakeClock, SequentialIdGen, TaskType};
use gaffer_engine::{
    AttachmentMode, ConflictConfig, ConflictDetector, NameGenerator, OrchestratorConfig,
    OrchestratorDeps, SchedulerConfig, ShellRenderer, SmartScheduler, WorkerManager,
    WorkerManagerConfig,
};
use gaffer_storage::StateManager;
use serde_json::json;

struct StaticNamer;

impl NameGenerator for StaticNamer {
    fn generate(&self, _task_type: TaskType) -> String {
        "otter".to_string()
    }
}

type TestHub = Hub<FakeSessionAdapter, SequentialIdGen, FakeClock>;

fn hub(dir: &std::path::Path) -> Arc<TestHub> {
    let (tx, _rx) = broadcast::channel(1024);
    let workers = WorkerManager::new(
        WorkerManagerConfig::default(),
        AttachmentMode::Multiplexer {
            pause_capable: true,
        },
        FakeSessionAdapter::new(),
        SequentialIdGen::new("w"),
        Arc::new(StaticNamer),
        tx.clone(),
    );
    let orch = Orchestrator::new(
        OrchestratorDeps {
            clock: FakeClock::new(),
            ids: SequentialIdGen::new("task"),
            workers,
            conflicts: ConflictDetector::new(ConflictConfig::default()),
            scheduler: SmartScheduler::new(SchedulerConfig::default()),
            state: StateManager::new(dir),
            renderer: Arc::new(ShellRenderer::new()),
            events: tx,
        },
        OrchestratorConfig {
            session_id: Some("sess".to_string()),
        },
    )
    .unwrap();
    Hub::new(Arc::new(orch))
}

fn request(id: i64, method: &str, params: Value) -> RpcRequest {
    RpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(id)),
        method: method.to_string(),
        params: Some(params),
    }
}

#[tokio::test]
async fn capabilities_advertises_tools() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub(dir.path());

    let response = hub
        .dispatch(request(1, "capabilities", json!({})))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "gafferd");
    assert_eq!(result["capabilities"]["tools"]["listChanged"], true);
}

#[tokio::test]
async fn tools_list_enumerates_registry() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub(dir.path());

    let response = hub
        .dispatch(request(2, "tools/list", json!({})))
        .await
        .unwrap();
    let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
    let names: Vec<&str> = tools
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"submit_task"));
    assert!(names.contains(&"get_session"));
    assert!(tools.iter().all(|t| t.get("inputSchema").is_some()));
}

#[tokio::test]
async fn unknown_method_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub(dir.path());

    let response = hub
        .dispatch(request(3, "frobnicate", json!({})))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub(dir.path());

    let response = hub
        .dispatch(request(4, "tools/call", json!({"name": "nope", "arguments": {}})))
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, METHOD_NOT_FOUND);
    assert!(error.message.contains("nope"));
}

#[tokio::test]
async fn bad_tool_params_are_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub(dir.path());

    // Missing required description
    let response = hub
        .dispatch(request(
            5,
            "tools/call",
            json!({"name": "submit_task", "arguments": {"type": "code"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, INVALID_PARAMS);

    // Missing tool name entirely
    let response = hub
        .dispatch(request(6, "tools/call", json!({"arguments": {}})))
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
}

#[tokio::test]
async fn domain_errors_carry_kind() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub(dir.path());

    // First task exists, second depends on its own id (next in sequence)
    hub.dispatch(request(
        7,
        "tools/call",
        json!({"name": "submit_task", "arguments": {"type": "code", "description": "a"}}),
    ))
    .await
    .unwrap();
    let response = hub
        .dispatch(request(
            8,
            "tools/call",
            json!({"name": "submit_task", "arguments": {
                "type": "code",
                "description": "self-referential",
                "dependencies": ["task-2"],
            }}),
        ))
        .await
        .unwrap();

    let error = response.error.unwrap();
    assert_eq!(error.code, INTERNAL_ERROR);
    assert_eq!(error.data.unwrap()["kind"], "Cycle");
}

#[tokio::test]
async fn notifications_get_no_response() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub(dir.path());

    let note = RpcRequest {
        jsonrpc: "2.0".to_string(),
        id: None,
        method: "tools/list".to_string(),
        params: None,
    };
    assert!(hub.dispatch(note).await.is_none());
}

#[tokio::test]
async fn registering_a_tool_pushes_list_changed() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub(dir.path());
    let mut pushes = hub.pushes.subscribe();

    hub.register_tool(ToolDef {
        name: "echo".to_string(),
        description: "echo arguments back".to_string(),
        input_schema: json!({"type": "object"}),
        handler: Arc::new(|params| Box::pin(async move { Ok(params) })),
    });

    let note = pushes.recv().await.unwrap();
    assert_eq!(note["method"], "tools/listChanged");
    assert!(hub.tool_names().contains(&"echo".to_string()));

    let response = hub
        .dispatch(request(
            9,
            "tools/call",
            json!({"name": "echo", "arguments": {"x": 1}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.result.unwrap()["x"], 1);
}

#[tokio::test]
async fn failing_custom_tool_maps_to_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub(dir.path());

    hub.register_tool(ToolDef {
        name: "broken".to_string(),
        description: "always fails".to_string(),
        input_schema: json!({"type": "object"}),
        handler: Arc::new(|_| {
            Box::pin(async move {
                Err(ToolError::Domain {
                    message: "it broke".to_string(),
                    kind: gaffer_core::ErrorKind::Busy,
                })
            })
        }),
    });

    let response = hub
        .dispatch(request(10, "tools/call", json!({"name": "broken"})))
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, INTERNAL_ERROR);
    assert_eq!(error.data.unwrap()["kind"], "Busy");
}

#[tokio::test]
async fn tcp_round_trip_with_initial_state() {
    let dir = tempfile::tempdir().unwrap();
    let hub = hub(dir.path());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(Arc::clone(&hub).run(listener));

    let mut stream = TcpStream::connect(addr).await.unwrap();

    // First frame is the initialState push
    let frame = wire::read_message(&mut stream).await.unwrap();
    let initial: Value = wire::decode(&frame).unwrap();
    assert_eq!(initial["method"], "initialState");
    assert_eq!(initial["params"]["session"]["id"], "sess");

    // tools/list round trip
    let request = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
    let payload = wire::encode(&request).unwrap();
    wire::write_message(&mut stream, &payload).await.unwrap();

    // Skip any interleaved notifications until our response arrives
    let response: Value = loop {
        let frame = wire::read_message(&mut stream).await.unwrap();
        let value: Value = wire::decode(&frame).unwrap();
        if value.get("id") == Some(&json!(1)) {
            break value;
        }
    };
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"submit_task"));
}
