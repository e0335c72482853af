//! Tool call handlers for MCP server.
//!
//! This module routes tool calls to the intervention engine and provides
//! consistent argument parsing and error handling.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::intervention::{BranchOptions, EntryFilter, OutcomeStatus, PipelineContext};

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    debug!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "intervention_pipeline" => handle_pipeline(state, arguments).await,
        "intervention_analyze" => handle_analyze(state, arguments).await,
        "intervention_check" => handle_check(state, arguments).await,
        "intervention_branch" => handle_branch(state, arguments).await,
        "intervention_detect_refusal" => handle_detect_refusal(state, arguments).await,
        "intervention_record_outcome" => handle_record_outcome(state, arguments).await,
        "intervention_record_alternative" => handle_record_alternative(state, arguments).await,
        "intervention_entries" => handle_entries(state, arguments).await,
        "intervention_learned_patterns" => handle_learned_patterns(state).await,
        "intervention_stats" => handle_stats(state).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Parameter types
// ============================================================================

/// Prompt plus optional caller context.
#[derive(Debug, Deserialize)]
struct PromptParams {
    prompt: String,
    #[serde(default)]
    context: PipelineContext,
}

/// Prompt analysis; the prompt may be absent.
#[derive(Debug, Deserialize)]
struct AnalyzeParams {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    context: PipelineContext,
}

#[derive(Debug, Deserialize)]
struct BranchParams {
    prompt: String,
    #[serde(default)]
    context: PipelineContext,
    #[serde(default)]
    max_branches: Option<usize>,
    #[serde(default)]
    strategies: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct DetectRefusalParams {
    #[serde(default)]
    response: Value,
}

#[derive(Debug, Deserialize)]
struct RecordOutcomeParams {
    log_id: String,
    status: OutcomeStatus,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordAlternativeParams {
    alternative: String,
    success: bool,
}

/// Acknowledgement for mutating tools.
#[derive(Debug, Serialize)]
struct UpdateResponse {
    updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_pipeline(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: PromptParams = parse_arguments("intervention_pipeline", arguments)?;
    let result = state
        .engine
        .run_pipeline(&params.prompt, &params.context)
        .await;
    info!(
        intervention = result.intervention,
        log_id = ?result.log_id,
        "Pipeline tool completed"
    );
    serde_json::to_value(result).map_err(McpError::Json)
}

async fn handle_analyze(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    // Analysis tolerates a missing argument object.
    let params = match arguments {
        Some(args) => parse_arguments::<AnalyzeParams>("intervention_analyze", Some(args))?,
        None => AnalyzeParams {
            prompt: None,
            context: PipelineContext::default(),
        },
    };
    let analysis = state
        .engine
        .analyze(params.prompt.as_deref(), &params.context)
        .await;
    serde_json::to_value(analysis.as_ref()).map_err(McpError::Json)
}

async fn handle_check(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: PromptParams = parse_arguments("intervention_check", arguments)?;
    let result = state.engine.check(&params.prompt, &params.context).await;
    serde_json::to_value(result).map_err(McpError::Json)
}

async fn handle_branch(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: BranchParams = parse_arguments("intervention_branch", arguments)?;
    let options = BranchOptions {
        max_branches: params.max_branches,
        strategies: params.strategies,
    };
    let branches = state
        .engine
        .create_branches(&params.prompt, &params.context, &options)
        .await;
    serde_json::to_value(branches).map_err(McpError::Json)
}

async fn handle_detect_refusal(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: DetectRefusalParams = parse_arguments("intervention_detect_refusal", arguments)?;
    let detection = state.engine.detect_refusal(&params.response).await;
    serde_json::to_value(detection).map_err(McpError::Json)
}

async fn handle_record_outcome(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "intervention_record_outcome",
        arguments,
        |params: RecordOutcomeParams| async move {
            let updated = state
                .engine
                .record_outcome(&params.log_id, params.status, params.notes)
                .await;
            if updated {
                Ok(UpdateResponse {
                    updated,
                    message: None,
                })
            } else {
                Err(format!("Unknown intervention log id: {}", params.log_id))
            }
        },
    )
    .await
}

async fn handle_record_alternative(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    let params: RecordAlternativeParams =
        parse_arguments("intervention_record_alternative", arguments)?;
    state
        .engine
        .record_alternative_result(&params.alternative, params.success)
        .await;
    serde_json::to_value(UpdateResponse {
        updated: true,
        message: Some(format!(
            "Recorded {} for {}",
            if params.success { "success" } else { "failure" },
            params.alternative
        )),
    })
    .map_err(McpError::Json)
}

async fn handle_entries(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let filter = match arguments {
        Some(args) => parse_arguments::<EntryFilter>("intervention_entries", Some(args))?,
        None => EntryFilter::default(),
    };
    let entries = state.engine.entries(&filter).await;
    serde_json::to_value(serde_json::json!({
        "count": entries.len(),
        "entries": entries,
    }))
    .map_err(McpError::Json)
}

async fn handle_learned_patterns(state: &SharedState) -> McpResult<Value> {
    let patterns = state.engine.learned_patterns().await;
    serde_json::to_value(patterns).map_err(McpError::Json)
}

async fn handle_stats(state: &SharedState) -> McpResult<Value> {
    let stats = state.engine.stats().await;
    serde_json::to_value(stats).map_err(McpError::Json)
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Generic handler that runs an engine operation with consistent error handling.
///
/// Parses `P` from the arguments, maps operation errors to
/// [`McpError::ExecutionFailed`] and serializes the result.
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: std::fmt::Display,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(result).map_err(McpError::Json)
}
