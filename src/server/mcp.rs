//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! JSON-RPC 2.0 request/response handling over stdio, plus the tool
//! definitions exposing the intervention engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

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
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier, null when the request carried none.
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

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
}

/// MCP Server running over stdio.
///
/// Handles JSON-RPC 2.0 messages over stdin/stdout for MCP protocol
/// communication with clients.
pub struct McpServer {
    /// Shared application state.
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Semantic intervention MCP server starting...");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            // Notifications produce no response
            if let Some(response) = self.handle_line(trimmed).await {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one framed JSON-RPC message.
    ///
    /// Returns `None` for notifications. Unparseable input yields a -32700 error.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        debug!(request = %line, "Received request");

        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                Some(JsonRpcResponse::error(
                    None,
                    -32700,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Handle a single JSON-RPC request
    /// Returns None for notifications (requests without id)
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        // Check if this is a notification (no id = no response required)
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" => {
                // Notification - no response per JSON-RPC 2.0
                debug!("Received initialized notification");
                None
            }
            "notifications/cancelled" => {
                // Notification - no response
                debug!("Received cancelled notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                // For unknown methods, only respond if it's a request (has id)
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "semantic-intervention".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");

        let tools = all_tools();

        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "tools": tools
            }),
        )
    }

    /// Handle tools/call request
    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let (content, is_error) =
            match handle_tool_call(&self.state, &params.name, params.arguments).await {
                Ok(result) => {
                    let text = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                        error!(error = %e, "Failed to serialize tool result");
                        format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                    });
                    (
                        ToolResultContent {
                            content_type: "text".to_string(),
                            text,
                        },
                        None,
                    )
                }
                Err(e) => (
                    ToolResultContent {
                        content_type: "text".to_string(),
                        text: format!("Error: {}", e),
                    },
                    Some(true),
                ),
            };

        let tool_result = ToolCallResult {
            content: vec![content],
            is_error,
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id.clone(), -32603, format!("Internal error: {}", e))
            }
        }
    }
}

// ============================================================================
// Tool Definitions
// ============================================================================

/// Every tool the server advertises, in listing order.
pub fn all_tools() -> Vec<Tool> {
    vec![
        get_pipeline_tool(),
        get_analyze_tool(),
        get_check_tool(),
        get_branch_tool(),
        get_detect_refusal_tool(),
        get_record_outcome_tool(),
        get_record_alternative_tool(),
        get_entries_tool(),
        get_learned_patterns_tool(),
        get_stats_tool(),
    ]
}

/// JSON Schema shared by tools that accept a caller context.
fn context_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "description": "Caller context for the prompt",
        "properties": {
            "files": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Files the task touches"
            },
            "estimated_files": {
                "type": "integer",
                "minimum": 0,
                "description": "Estimated number of files to change"
            },
            "estimated_time": {
                "type": "integer",
                "minimum": 0,
                "description": "Estimated effort in minutes"
            },
            "previous_attempts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "success": { "type": "boolean" },
                        "error": { "type": "string" }
                    },
                    "required": ["success"]
                },
                "description": "Earlier attempts at the same task"
            }
        }
    })
}

/// Get the full pipeline tool definition
fn get_pipeline_tool() -> Tool {
    Tool {
        name: "intervention_pipeline".to_string(),
        description: "Run the full intervention pipeline on a prompt: analyze it, decide whether to intervene, then branch over solution strategies or build an action plan (clarification, decomposition or validation). Returns proceed=true when no intervention is needed.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The task prompt to evaluate"
                },
                "context": context_schema()
            },
            "required": ["prompt"]
        }),
    }
}

/// Get the analyze tool definition
fn get_analyze_tool() -> Tool {
    Tool {
        name: "intervention_analyze".to_string(),
        description: "Semantic analysis of a prompt: intent, complexity (0-100), risk score and level, frameworks, patterns, entities and the recommended thinking mode.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The prompt to analyze"
                },
                "context": context_schema()
            }
        }),
    }
}

/// Get the trigger check tool definition
fn get_check_tool() -> Tool {
    Tool {
        name: "intervention_check".to_string(),
        description: "Analyze a prompt and report which intervention would fire, without logging or acting on it.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The prompt to check"
                },
                "context": context_schema()
            },
            "required": ["prompt"]
        }),
    }
}

/// Get the parallel branching tool definition
fn get_branch_tool() -> Tool {
    Tool {
        name: "intervention_branch".to_string(),
        description: "Explore a prompt with several solution strategies concurrently and recommend the most confident one.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The task prompt to explore"
                },
                "context": context_schema(),
                "max_branches": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 4,
                    "description": "Upper bound on explored strategies"
                },
                "strategies": {
                    "type": "array",
                    "items": {
                        "type": "string",
                        "enum": ["conservative", "moderate", "aggressive", "alternative"]
                    },
                    "description": "Explicit strategies to explore"
                }
            },
            "required": ["prompt"]
        }),
    }
}

/// Get the refusal detection tool definition
fn get_detect_refusal_tool() -> Tool {
    Tool {
        name: "intervention_detect_refusal".to_string(),
        description: "Classify a downstream response as a direct, ambiguous, blocked or partial refusal and suggest alternative approaches.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "response": {
                    "description": "Response text, or any JSON value to inspect"
                }
            },
            "required": ["response"]
        }),
    }
}

/// Get the outcome recording tool definition
fn get_record_outcome_tool() -> Tool {
    Tool {
        name: "intervention_record_outcome".to_string(),
        description: "Attach an outcome to a logged intervention so effectiveness can be learned.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "log_id": {
                    "type": "string",
                    "description": "Log id returned by intervention_pipeline"
                },
                "status": {
                    "type": "string",
                    "enum": ["success", "partial", "failed", "unknown"],
                    "description": "How the intervention turned out"
                },
                "notes": {
                    "type": "string",
                    "description": "Optional free-form notes"
                }
            },
            "required": ["log_id", "status"]
        }),
    }
}

/// Get the alternative result recording tool definition
fn get_record_alternative_tool() -> Tool {
    Tool {
        name: "intervention_record_alternative".to_string(),
        description: "Record whether a suggested refusal alternative worked.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "alternative": {
                    "type": "string",
                    "description": "Name of the alternative approach"
                },
                "success": {
                    "type": "boolean",
                    "description": "Whether the alternative succeeded"
                }
            },
            "required": ["alternative", "success"]
        }),
    }
}

/// Get the log entries tool definition
fn get_entries_tool() -> Tool {
    Tool {
        name: "intervention_entries".to_string(),
        description: "List logged interventions, newest last, optionally filtered by type and time.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["multi-path", "clarification", "decomposition", "validation", "alternative"],
                    "description": "Only entries of this intervention type"
                },
                "since": {
                    "type": "string",
                    "format": "date-time",
                    "description": "Only entries at or after this RFC 3339 timestamp"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Keep only the newest N matches"
                }
            }
        }),
    }
}

/// Get the learned patterns tool definition
fn get_learned_patterns_tool() -> Tool {
    Tool {
        name: "intervention_learned_patterns".to_string(),
        description: "Common triggers and which intervention types have proven effective or ineffective, with recommendations.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {}
        }),
    }
}

/// Get the stats tool definition
fn get_stats_tool() -> Tool {
    Tool {
        name: "intervention_stats".to_string(),
        description: "Aggregated statistics for the analyzer, trigger, brancher, refusal detector and intervention log.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {}
        }),
    }
}
