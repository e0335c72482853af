//! Unit tests for the MCP protocol layer.
//!
//! Covers JSON-RPC framing, tool definitions and request dispatch
//! against an offline intervention engine.

use super::*;
use crate::config::{Config, LoggingConfig, RequestConfig, ThinkingPipeConfig};
use crate::intervention::{EngineConfig, InterventionEngine};
use crate::server::AppState;
use crate::thinking::UnavailableThinkingService;
use serde_json::json;
use std::sync::Arc;

fn create_test_server() -> McpServer {
    let config = Config {
        langbase: None,
        logging: LoggingConfig::default(),
        request: RequestConfig::default(),
        pipes: ThinkingPipeConfig::default(),
        engine: EngineConfig::default(),
    };
    let engine = InterventionEngine::new(
        config.engine.clone(),
        Arc::new(UnavailableThinkingService),
    );
    McpServer::new(Arc::new(AppState::new(config, Arc::new(engine))))
}

fn tool_call(id: i64, name: &str, arguments: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
    .to_string()
}

// ============================================================================
// JsonRpcResponse tests
// ============================================================================

#[test]
fn test_jsonrpc_response_success_without_id() {
    let response = JsonRpcResponse::success(None, json!({"data": "value"}));

    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, Value::Null);
    assert!(response.error.is_none());
}

#[test]
fn test_jsonrpc_error_omits_result() {
    let response = JsonRpcResponse::error(Some(json!("req-7")), -32601, "Method not found");
    let serialized = serde_json::to_string(&response).unwrap();

    assert!(serialized.contains("\"id\":\"req-7\""));
    assert!(serialized.contains("-32601"));
    assert!(!serialized.contains("\"result\""));
}

#[test]
fn test_jsonrpc_notification_has_no_id() {
    let json_str = r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#;
    let request: JsonRpcRequest = serde_json::from_str(json_str).unwrap();

    assert!(request.id.is_none());
    assert_eq!(request.method, "initialized");
}

#[test]
fn test_tool_call_params_without_arguments() {
    let json_str = r#"{"name":"intervention_stats"}"#;
    let params: ToolCallParams = serde_json::from_str(json_str).unwrap();

    assert_eq!(params.name, "intervention_stats");
    assert!(params.arguments.is_none());
}

// ============================================================================
// Tool definition tests
// ============================================================================

#[test]
fn test_all_tools_count() {
    assert_eq!(all_tools().len(), 10, "Should have exactly 10 tools defined");
}

#[test]
fn test_all_tools_have_valid_schemas() {
    for tool in all_tools() {
        assert!(tool.name.starts_with("intervention_"), "{}", tool.name);
        assert!(!tool.description.is_empty());
        assert_eq!(
            tool.input_schema["type"], "object",
            "Schema type should be object for {}",
            tool.name
        );
        assert!(
            tool.input_schema["properties"].is_object(),
            "Schema should have properties for {}",
            tool.name
        );
    }
}

#[test]
fn test_tool_names_are_unique() {
    let mut names: Vec<String> = all_tools().into_iter().map(|t| t.name).collect();
    let original_len = names.len();
    names.sort();
    names.dedup();

    assert_eq!(names.len(), original_len, "All tool names should be unique");
}

#[test]
fn test_pipeline_tool_requires_prompt() {
    let tool = get_pipeline_tool();
    assert_eq!(tool.input_schema["required"], json!(["prompt"]));
    let context = &tool.input_schema["properties"]["context"];
    assert!(context["properties"]["estimated_files"].is_object());
}

#[test]
fn test_record_outcome_tool_statuses() {
    let tool = get_record_outcome_tool();
    assert_eq!(
        tool.input_schema["properties"]["status"]["enum"],
        json!(["success", "partial", "failed", "unknown"])
    );
}

#[test]
fn test_branch_tool_strategy_enum() {
    let tool = get_branch_tool();
    let strategies = &tool.input_schema["properties"]["strategies"]["items"]["enum"];
    assert_eq!(strategies.as_array().unwrap().len(), 4);
}

// ============================================================================
// Dispatch tests
// ============================================================================

#[tokio::test]
async fn test_initialize_reports_server_info() {
    let server = create_test_server();
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "semantic-intervention");
    assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
}

#[tokio::test]
async fn test_tools_list() {
    let server = create_test_server();
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
        .await
        .unwrap();

    let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
    assert_eq!(tools.len(), 10);
    assert_eq!(tools[0]["name"], "intervention_pipeline");
    assert!(tools[0]["inputSchema"].is_object());
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let server = create_test_server();
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"initialized"}"#)
        .await
        .is_none());
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{}}"#)
        .await
        .is_none());
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/unknown"}"#)
        .await
        .is_none());
}

#[tokio::test]
async fn test_unknown_method() {
    let server = create_test_server();
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#)
        .await
        .unwrap();

    let error = response.error.unwrap();
    assert_eq!(error.code, -32601);
    assert!(error.message.contains("resources/list"));
}

#[tokio::test]
async fn test_parse_error() {
    let server = create_test_server();
    let response = server.handle_line("{not json").await.unwrap();

    assert_eq!(response.id, Value::Null);
    assert_eq!(response.error.unwrap().code, -32700);
}

#[tokio::test]
async fn test_ping() {
    let server = create_test_server();
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#)
        .await
        .unwrap();

    assert_eq!(response.id, json!("p"));
    assert_eq!(response.result.unwrap(), json!({}));
}

#[tokio::test]
async fn test_tool_call_missing_params() {
    let server = create_test_server();
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":4,"method":"tools/call"}"#)
        .await
        .unwrap();

    let error = response.error.unwrap();
    assert_eq!(error.code, -32602);
    assert_eq!(error.message, "Missing params");
}

#[tokio::test]
async fn test_tool_call_success_is_pretty_json() {
    let server = create_test_server();
    let response = server
        .handle_line(&tool_call(
            5,
            "intervention_pipeline",
            json!({"prompt": "Fix a typo in README"}),
        ))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert!(result.get("isError").is_none());
    assert_eq!(result["content"][0]["type"], "text");

    let text = result["content"][0]["text"].as_str().unwrap();
    let verdict: Value = serde_json::from_str(text).unwrap();
    assert_eq!(verdict["proceed"], true);
}

#[tokio::test]
async fn test_tool_call_error_sets_is_error() {
    let server = create_test_server();
    let response = server
        .handle_line(&tool_call(6, "intervention_check", json!({"context": {}})))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with("Error: Invalid parameters for intervention_check"));
}

#[tokio::test]
async fn test_tool_call_unknown_tool() {
    let server = create_test_server();
    let response = server
        .handle_line(&tool_call(7, "intervention_rewrite", json!({})))
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["isError"], true);
    assert_eq!(result["content"][0]["text"], "Error: Unknown tool: intervention_rewrite");
}
