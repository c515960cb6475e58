// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC hub: tool dispatch plus event fan-out over a streaming transport.
//!
//! One TCP connection carries requests in and responses plus server-pushed
//! notifications out. Each connection gets a reader loop and a single
//! writer task fed from an mpsc queue, so responses and events interleave
//! in FIFO order per client.

use crate::rpc::{
    notification, RpcRequest, RpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::tools::{builtin_tools, ToolDef, ToolError};
use crate::wire;
use gaffer_adapters::session::SessionAdapter;
use gaffer_core::{Clock, IdGen};
use gaffer_engine::Orchestrator;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

/// Queue depth of pending frames per client before it is considered stuck.
const CLIENT_QUEUE: usize = 256;

pub struct Hub<S: SessionAdapter, G: IdGen + 'static, C: Clock + 'static> {
    orch: Arc<Orchestrator<S, G, C>>,
    tools: RwLock<IndexMap<String, ToolDef>>,
    /// Hub-level notifications (registry changes), fanned out like events
    pushes: broadcast::Sender<Value>,
}

impl<S: SessionAdapter, G: IdGen + 'static, C: Clock + 'static> Hub<S, G, C> {
    pub fn new(orch: Arc<Orchestrator<S, G, C>>) -> Arc<Self> {
        let mut tools = IndexMap::new();
        for tool in builtin_tools(Arc::clone(&orch)) {
            tools.insert(tool.name.clone(), tool);
        }
        let (pushes, _) = broadcast::channel(64);
        Arc::new(Self {
            orch,
            tools: RwLock::new(tools),
            pushes,
        })
    }

    /// Register (or replace) a tool; connected clients learn via
    /// `tools/listChanged`.
    pub fn register_tool(&self, tool: ToolDef) {
        self.tools.write().insert(tool.name.clone(), tool);
        let _ = self
            .pushes
            .send(notification("tools/listChanged", json!({})));
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// Accept connections until the listener is closed.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "client connected");
                    let hub = Arc::clone(&self);
                    tokio::spawn(async move {
                        match hub.handle_connection(stream).await {
                            Ok(()) | Err(wire::WireError::ConnectionClosed) => {
                                debug!(%peer, "client disconnected")
                            }
                            Err(e) => warn!(%peer, error = %e, "connection error"),
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) -> Result<(), wire::WireError> {
        let (mut reader, writer) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(CLIENT_QUEUE);
        tokio::spawn(write_frames(writer, out_rx));

        // Every client starts from the full session
        let initial = notification(
            "initialState",
            json!({"session": self.orch.get_session_data()}),
        );
        if out_tx.send(wire::encode(&initial)?).await.is_err() {
            return Ok(());
        }

        // Orchestrator events, in commit order
        let mut events = self.orch.subscribe();
        let events_tx = out_tx.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let params = match serde_json::to_value(&event) {
                            Ok(params) => params,
                            Err(e) => {
                                warn!(error = %e, "unserializable event");
                                continue;
                            }
                        };
                        let note = notification(event.name(), params);
                        let Ok(frame) = wire::encode(&note) else { continue };
                        if events_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // A client this far behind will never catch up
                        warn!(missed, "client lagged, dropping event stream");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Hub notifications (tools/listChanged)
        let mut pushes = self.pushes.subscribe();
        let pushes_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Ok(note) = pushes.recv().await {
                let Ok(frame) = wire::encode(&note) else { continue };
                if pushes_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        loop {
            let bytes = wire::read_message(&mut reader).await?;
            let request: RpcRequest = match wire::decode(&bytes) {
                Ok(request) => request,
                Err(e) => {
                    let response =
                        RpcResponse::error(Value::Null, PARSE_ERROR, format!("bad request: {e}"));
                    if out_tx.send(wire::encode(&response)?).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            if let Some(response) = self.dispatch(request).await {
                if out_tx.send(wire::encode(&response)?).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle one request. Notifications produce no response.
    pub async fn dispatch(&self, request: RpcRequest) -> Option<RpcResponse> {
        let id = request.id.clone()?;
        let response = match request.method.as_str() {
            "capabilities" => RpcResponse::ok(
                id,
                json!({
                    "serverInfo": {
                        "name": "gafferd",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": {
                        "tools": {"listChanged": true},
                    },
                }),
            ),

            "tools/list" => {
                let tools: Vec<Value> = self
                    .tools
                    .read()
                    .values()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "inputSchema": t.input_schema,
                        })
                    })
                    .collect();
                RpcResponse::ok(id, json!({"tools": tools}))
            }

            "tools/call" => self.call_tool(id, request.params).await,

            other => RpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            ),
        };
        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> RpcResponse {
        let params = params.unwrap_or_else(|| json!({}));
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return RpcResponse::error(id, INVALID_PARAMS, "tool name is required");
        };
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let handler = {
            let tools = self.tools.read();
            tools.get(name).map(|t| Arc::clone(&t.handler))
        };
        let Some(handler) = handler else {
            return RpcResponse::error(id, METHOD_NOT_FOUND, format!("tool not found: {name}"));
        };

        match handler(arguments).await {
            Ok(result) => RpcResponse::ok(id, result),
            Err(ToolError::InvalidParams(message)) => {
                RpcResponse::error(id, INVALID_PARAMS, message)
            }
            Err(ToolError::Domain { message, kind }) => RpcResponse::domain_error(id, message, kind),
        }
    }
}

async fn write_frames(mut writer: OwnedWriteHalf, mut out_rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = out_rx.recv().await {
        if let Err(e) = wire::write_message(&mut writer, &frame).await {
            debug!(error = %e, "writer closed");
            break;
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
