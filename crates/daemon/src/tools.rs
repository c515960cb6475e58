// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool registry and the built-in orchestrator tools.
//!
//! Tools are named, parameterized capabilities invoked via `tools/call`.
//! Each carries a JSON input schema for discovery through `tools/list`.

use gaffer_adapters::session::SessionAdapter;
use gaffer_core::{
    Attachment, Clock, ErrorKind, IdGen, TaskId, TaskParameters, TaskSpec, TaskType,
};
use gaffer_engine::{Orchestrator, OrchestratorError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;
pub type ToolHandler = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A registered tool.
#[derive(Clone)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub handler: ToolHandler,
}

/// Errors a tool call can produce.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{message}")]
    Domain { message: String, kind: ErrorKind },
}

impl From<OrchestratorError> for ToolError {
    fn from(e: OrchestratorError) -> Self {
        ToolError::Domain {
            message: e.to_string(),
            kind: e.kind(),
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolError> {
    serde_json::from_value(params).map_err(|e| ToolError::InvalidParams(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Domain {
        message: e.to_string(),
        kind: ErrorKind::Dispatch,
    })
}

#[derive(Debug, Deserialize)]
struct SubmitParams {
    #[serde(rename = "type")]
    task_type: String,
    description: String,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    parameters: Option<TaskParameters>,
    #[serde(default)]
    dependencies: Vec<String>,
    /// Absolute deadline, epoch milliseconds
    #[serde(default, rename = "deadline")]
    deadline_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkerQuery {
    #[serde(default)]
    worker_id: Option<String>,
    #[serde(default)]
    worker_name: Option<String>,
}

impl WorkerQuery {
    fn into_query(self) -> Result<String, ToolError> {
        self.worker_id
            .or(self.worker_name)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                ToolError::InvalidParams("workerId or workerName is required".to_string())
            })
    }
}

#[derive(Debug, Deserialize)]
struct SpawnParams {
    #[serde(rename = "type")]
    worker_type: String,
    #[serde(default)]
    capabilities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SaveParams {
    data: Value,
}

fn connection_json(attachment: &Attachment) -> Value {
    match attachment {
        Attachment::Multiplexer { session } => json!({
            "type": "multiplexer",
            "sessionName": session,
        }),
        Attachment::Process { pid } => json!({
            "type": "process",
            "pid": pid,
        }),
    }
}

/// The orchestrator tools every `gafferd` exposes.
pub fn builtin_tools<S, G, C>(orch: Arc<Orchestrator<S, G, C>>) -> Vec<ToolDef>
where
    S: SessionAdapter,
    G: IdGen + 'static,
    C: Clock + 'static,
{
    let worker_query_schema = json!({
        "type": "object",
        "properties": {
            "workerId": {"type": "string"},
            "workerName": {"type": "string"},
        },
    });

    let mut tools = Vec::new();

    {
        let orch = Arc::clone(&orch);
        tools.push(ToolDef {
            name: "submit_task".to_string(),
            description: "Submit a task for scheduling and dispatch".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["research", "code", "test", "analysis", "swarm", "hive-mind"]},
                    "description": {"type": "string"},
                    "priority": {"type": "integer"},
                    "parameters": {"type": "object"},
                    "dependencies": {"type": "array", "items": {"type": "string"}},
                    "deadline": {"type": "integer"},
                },
                "required": ["type", "description"],
            }),
            handler: Arc::new(move |params| {
                let orch = Arc::clone(&orch);
                Box::pin(async move {
                    let params: SubmitParams = parse_params(params)?;
                    let task_type = TaskType::parse(&params.task_type).ok_or_else(|| {
                        ToolError::InvalidParams(format!(
                            "unknown task type: {}",
                            params.task_type
                        ))
                    })?;
                    let mut spec = TaskSpec::new(task_type, params.description);
                    if let Some(priority) = params.priority {
                        spec.priority = priority;
                    }
                    if let Some(parameters) = params.parameters {
                        spec.parameters = parameters;
                    }
                    spec.deadline_ms = params.deadline_ms;
                    spec.dependencies = params.dependencies.into_iter().map(TaskId::new).collect();

                    let outcome = orch.submit_task(spec)?;
                    let mut result = json!({
                        "taskId": outcome.task.id,
                        "status": "submitted",
                    });
                    if !outcome.conflicts.is_empty() {
                        result["conflicts"] = to_value(&outcome.conflicts)?;
                    }
                    Ok(result)
                })
            }),
        });
    }

    {
        let orch = Arc::clone(&orch);
        tools.push(ToolDef {
            name: "list_workers".to_string(),
            description: "List all workers with status and resources".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
            handler: Arc::new(move |_params| {
                let orch = Arc::clone(&orch);
                Box::pin(async move { to_value(&orch.list_workers()) })
            }),
        });
    }

    {
        let orch = Arc::clone(&orch);
        tools.push(ToolDef {
            name: "connect_worker".to_string(),
            description: "Resolve a worker's session for direct attachment".to_string(),
            input_schema: worker_query_schema.clone(),
            handler: Arc::new(move |params| {
                let orch = Arc::clone(&orch);
                Box::pin(async move {
                    let query: WorkerQuery = parse_params(params)?;
                    let info = orch.connect_info(&query.into_query()?)?;
                    Ok(json!({
                        "workerId": info.worker_id,
                        "workerName": info.descriptive_name,
                        "connection": connection_json(&info.attachment),
                    }))
                })
            }),
        });
    }

    {
        let orch = Arc::clone(&orch);
        tools.push(ToolDef {
            name: "pause_worker".to_string(),
            description: "Suspend a running worker".to_string(),
            input_schema: worker_query_schema.clone(),
            handler: Arc::new(move |params| {
                let orch = Arc::clone(&orch);
                Box::pin(async move {
                    let query: WorkerQuery = parse_params(params)?;
                    orch.pause_worker(&query.into_query()?).await?;
                    Ok(json!({"status": "paused"}))
                })
            }),
        });
    }

    {
        let orch = Arc::clone(&orch);
        tools.push(ToolDef {
            name: "resume_worker".to_string(),
            description: "Resume a paused worker".to_string(),
            input_schema: worker_query_schema.clone(),
            handler: Arc::new(move |params| {
                let orch = Arc::clone(&orch);
                Box::pin(async move {
                    let query: WorkerQuery = parse_params(params)?;
                    orch.resume_worker(&query.into_query()?).await?;
                    Ok(json!({"status": "running"}))
                })
            }),
        });
    }

    {
        let orch = Arc::clone(&orch);
        tools.push(ToolDef {
            name: "get_session".to_string(),
            description: "Fetch the full session state".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
            handler: Arc::new(move |_params| {
                let orch = Arc::clone(&orch);
                Box::pin(async move { to_value(&orch.get_session_data()) })
            }),
        });
    }

    {
        let orch = Arc::clone(&orch);
        tools.push(ToolDef {
            name: "save_session".to_string(),
            description: "Merge partial session data and save to disk".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"data": {"type": "object"}},
                "required": ["data"],
            }),
            handler: Arc::new(move |params| {
                let orch = Arc::clone(&orch);
                Box::pin(async move {
                    let params: SaveParams = parse_params(params)?;
                    orch.save_session_data(params.data);
                    Ok(json!({"status": "saved"}))
                })
            }),
        });
    }

    {
        let orch = Arc::clone(&orch);
        tools.push(ToolDef {
            name: "spawn_worker".to_string(),
            description: "Spawn an idle worker of the given type".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "type": {"type": "string"},
                    "capabilities": {"type": "array", "items": {"type": "string"}},
                },
                "required": ["type"],
            }),
            handler: Arc::new(move |params| {
                let orch = Arc::clone(&orch);
                Box::pin(async move {
                    let params: SpawnParams = parse_params(params)?;
                    let worker_type = TaskType::parse(&params.worker_type).ok_or_else(|| {
                        ToolError::InvalidParams(format!(
                            "unknown worker type: {}",
                            params.worker_type
                        ))
                    })?;
                    let worker = orch
                        .spawn_worker(worker_type, params.capabilities.into_iter().collect())
                        .await?;
                    to_value(&worker)
                })
            }),
        });
    }

    {
        let orch = Arc::clone(&orch);
        tools.push(ToolDef {
            name: "get_worker".to_string(),
            description: "Fetch one worker by id or name".to_string(),
            input_schema: worker_query_schema,
            handler: Arc::new(move |params| {
                let orch = Arc::clone(&orch);
                Box::pin(async move {
                    let query: WorkerQuery = parse_params(params)?;
                    to_value(&orch.get_worker(&query.into_query()?)?)
                })
            }),
        });
    }

    tools
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
