// MCP server: newline-delimited JSON-RPC 2.0 over stdio

pub mod tools;

use crate::config::Config;
use crate::error::{KraangError, Result};
use crate::storage::SqliteStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// MCP revision advertised during `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const SERVER_NAME: &str = "kraang";

const INSTRUCTIONS: &str = "kraang is a project knowledge base. Use `remember` to save notes, \
`recall` to search notes and past sessions, `read_session` to load a transcript, \
`forget` to hide outdated notes and `status` for an overview.";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Incoming JSON-RPC message; requests without an id are notifications
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Tool dispatch state shared by every request
#[derive(Clone)]
pub struct Server {
    store: Arc<SqliteStore>,
    config: Arc<Config>,
}

impl Server {
    pub fn new(store: Arc<SqliteStore>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// Handle one raw line; `None` means nothing should be written back
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Unparseable message: {}", e);
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => id.map(|id| {
                JsonRpcResponse::error(id, INVALID_REQUEST, format!("Invalid request: {}", e))
            }),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            tracing::debug!("Notification: {}", request.method);
            return None;
        };

        tracing::debug!("Request {}: {}", id, request.method);
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tools::definitions() })),
            "tools/call" => match self.call_tool(request.params.unwrap_or(Value::Null)).await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(KraangError::InvalidInput(message)) => {
                    JsonRpcResponse::error(id, INVALID_PARAMS, message)
                }
                Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
            },
            other => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };
        Some(response)
    }

    /// Run a tool on the blocking pool and wrap its text as MCP content
    async fn call_tool(&self, params: Value) -> Result<Value> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| KraangError::InvalidInput("tools/call requires a tool name".to_string()))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let server = self.clone();
        let output = tokio::task::spawn_blocking(move || {
            tools::dispatch(&server.store, &server.config, &name, &arguments)
        })
        .await
        .map_err(|e| KraangError::Other(anyhow::anyhow!("tool task failed: {}", e)))?;

        Ok(json!({
            "content": [{ "type": "text", "text": output.text }],
            "isError": output.is_error,
        }))
    }

    /// Serve until the reader reaches end of input
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await.map_err(|e| KraangError::Io {
            source: e,
            context: "Failed to read from stdin".to_string(),
        })? {
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let mut payload = serde_json::to_vec(&response).map_err(|e| KraangError::Json {
                source: e,
                context: "Failed to serialize response".to_string(),
            })?;
            payload.push(b'\n');
            writer.write_all(&payload).await.map_err(|e| KraangError::Io {
                source: e,
                context: "Failed to write response".to_string(),
            })?;
            writer.flush().await.map_err(|e| KraangError::Io {
                source: e,
                context: "Failed to flush stdout".to_string(),
            })?;
        }
        tracing::info!("Input closed, shutting down");
        Ok(())
    }

    pub async fn serve_stdio(&self) -> Result<()> {
        tracing::info!("MCP server ready on stdio");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "instructions": INSTRUCTIONS,
    })
}
