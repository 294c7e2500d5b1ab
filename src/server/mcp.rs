//! JSON-RPC 2.0 protocol over newline-delimited stdio.
//!
//! This module provides:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - The line-oriented server loop

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    /// Request identifier, null when the request could not be parsed.
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server identification returned by `initialize`.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Result of the initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: Value,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// Tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    /// Successful call carrying pretty-printed JSON
    fn ok(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
            error!(error = %e, "Failed to render tool result");
            value.to_string()
        });
        Self {
            content: vec![ToolResultContent::text(text)],
            is_error: None,
        }
    }

    /// Failed call; the caller sees the message, the transport stays healthy
    fn failed(message: impl std::fmt::Display) -> Self {
        Self {
            content: vec![ToolResultContent::text(format!("Error: {}", message))],
            is_error: Some(true),
        }
    }
}

impl ToolResultContent {
    fn text(text: String) -> Self {
        Self {
            content_type: "text".to_string(),
            text,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

const PROTOCOL_VERSION: &str = "2024-11-05";

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Serialize `result` into a success, or an internal error if that fails
    fn from_serializable<T: Serialize>(id: Option<Value>, result: T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self::success(id, value),
            Err(e) => {
                error!(error = %e, "Failed to serialize result");
                Self::error(id, codes::INTERNAL_ERROR, format!("Internal error: {}", e))
            }
        }
    }
}

/// JSON-RPC server. One request per line in, one response per line out.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    /// Create a new server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve stdin/stdout until the client closes the stream
    pub async fn run(&self) -> std::io::Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve requests from `reader` until EOF, writing responses to `writer`.
    ///
    /// Blank lines are skipped. Unparseable lines get a parse error with a
    /// null id; notifications get nothing.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            let payload = line.trim();
            if payload.is_empty() {
                continue;
            }
            debug!(request = %payload, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(payload) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    warn!(error = %e, "Discarding malformed request line");
                    Some(JsonRpcResponse::error(
                        None,
                        codes::PARSE_ERROR,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            let Some(response) = response else { continue };
            let mut encoded = serde_json::to_vec(&response)?;
            encoded.push(b'\n');
            writer.write_all(&encoded).await?;
            writer.flush().await?;
        }

        info!("Input closed, server stopping");
        Ok(())
    }

    /// Handle a single request. Returns None for notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;
        let is_notification = id.is_none();

        if jsonrpc != "2.0" {
            warn!(version = %jsonrpc, "Rejecting request with wrong protocol version");
            return (!is_notification).then(|| {
                JsonRpcResponse::error(
                    id,
                    codes::INVALID_REQUEST,
                    "Invalid request: jsonrpc must be \"2.0\"",
                )
            });
        }

        let response = match method.as_str() {
            "initialize" => JsonRpcResponse::from_serializable(
                id,
                InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: json!({ "tools": { "listChanged": false } }),
                    server_info: ServerInfo {
                        name: env!("CARGO_PKG_NAME").to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    },
                },
            ),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tool_definitions() })),
            "tools/call" => self.call_tool(id, params).await,
            "ping" => JsonRpcResponse::success(id, json!({})),
            _ if is_notification => {
                debug!(method = %method, "Notification acknowledged");
                return None;
            }
            _ => {
                warn!(method = %method, "Unknown method");
                JsonRpcResponse::error(
                    id,
                    codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                )
            }
        };
        Some(response)
    }

    async fn call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, codes::INVALID_PARAMS, "Missing params");
        };
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    codes::INVALID_PARAMS,
                    format!("Invalid params: {}", e),
                );
            }
        };

        let result = match handle_tool_call(&self.state, &params.name, params.arguments).await {
            Ok(value) => ToolCallResult::ok(&value),
            Err(e) => {
                warn!(tool = %params.name, error = %e, "Tool call failed");
                ToolCallResult::failed(e)
            }
        };
        JsonRpcResponse::from_serializable(id, result)
    }
}

fn user_only_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "user_id": {"type": "string", "description": "Opaque user identifier"}
        },
        "required": ["user_id"]
    })
}

/// Every tool the server exposes.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "route".to_string(),
            description: "Analyze one user message and return the arbitrated, normalized intent decision.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "The user's message"},
                    "user_id": {"type": "string", "description": "Opaque user identifier"},
                    "conversation_history": {
                        "type": "array",
                        "description": "Overrides the stored history sent to the AI analyzer",
                        "items": {"type": "object"}
                    },
                    "options": {
                        "type": "object",
                        "properties": {
                            "debug": {"type": "boolean"},
                            "ai_confidence_threshold": {"type": "number", "minimum": 0, "maximum": 1},
                            "regex_strength_threshold": {"type": "number", "minimum": 0, "maximum": 1},
                            "fallback_threshold": {"type": "number", "minimum": 0, "maximum": 1}
                        }
                    }
                },
                "required": ["text", "user_id"]
            }),
        },
        Tool {
            name: "get_context".to_string(),
            description: "Return the user's conversation state, creating it on first access.".to_string(),
            input_schema: user_only_schema(),
        },
        Tool {
            name: "clear_context".to_string(),
            description: "Delete the user's conversation state.".to_string(),
            input_schema: user_only_schema(),
        },
        Tool {
            name: "set_expected_input".to_string(),
            description: "Enter a multi-step flow and declare which input categories are awaited.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "flow": {
                        "type": "string",
                        "enum": ["course_creation", "course_modification", "course_cancellation",
                                 "recurring_setup", "reminder_setup", "lesson_record"]
                    },
                    "categories": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["confirmation", "modification", "course_name", "student_name",
                                     "time", "date", "selection"]
                        }
                    },
                    "pending_data": {"type": "object"}
                },
                "required": ["user_id", "flow", "categories"]
            }),
        },
        Tool {
            name: "is_expecting_input".to_string(),
            description: "Check whether an input category is currently awaited.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "category": {"type": "string"}
                },
                "required": ["user_id", "category"]
            }),
        },
        Tool {
            name: "clear_expected_input".to_string(),
            description: "Leave the current flow and drop pending slots.".to_string(),
            input_schema: user_only_schema(),
        },
        Tool {
            name: "record_bot_response".to_string(),
            description: "Append the assistant's reply to the user's history.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "text": {"type": "string"},
                    "meta": {"type": "object"}
                },
                "required": ["user_id", "text"]
            }),
        },
        Tool {
            name: "record_task_result".to_string(),
            description: "Record a task handler outcome; kept per action for undo.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "action": {"type": "string"},
                    "input": {},
                    "result": {}
                },
                "required": ["user_id", "action"]
            }),
        },
        Tool {
            name: "cache_stats".to_string(),
            description: "Normalizer cache sizes, hit ratio, utilization and tuning suggestions.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        Tool {
            name: "clear_cache".to_string(),
            description: "Empty the lookup and fuzzy cache tiers. The precomputed table is kept.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "reset_stats": {"type": "boolean", "default": false}
                }
            }),
        },
    ]
}
