use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::SharedState;
use crate::analysis::Entities;
use crate::context::{ConversationFlow, HistoryEntry, InputCategory};
use crate::error::{RpcError, RpcResult};
use crate::router::RouteOptions;

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> RpcResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "route" => handle_route(state, arguments).await,
        "get_context" => handle_get_context(state, arguments).await,
        "clear_context" => handle_clear_context(state, arguments).await,
        "set_expected_input" => handle_set_expected_input(state, arguments).await,
        "is_expecting_input" => handle_is_expecting_input(state, arguments).await,
        "clear_expected_input" => handle_clear_expected_input(state, arguments).await,
        "record_bot_response" => handle_record_bot_response(state, arguments).await,
        "record_task_result" => handle_record_task_result(state, arguments).await,
        "cache_stats" => handle_cache_stats(state).await,
        "clear_cache" => handle_clear_cache(state, arguments).await,
        _ => Err(RpcError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Parameter types
// ============================================================================

/// Arguments of the `route` tool.
#[derive(Debug, Deserialize)]
pub struct RouteParams {
    pub text: String,
    pub user_id: String,
    #[serde(default)]
    pub conversation_history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    pub options: Option<RouteOptions>,
}

/// Arguments naming only a user.
#[derive(Debug, Deserialize)]
pub struct UserParams {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetExpectedInputParams {
    pub user_id: String,
    pub flow: String,
    pub categories: Vec<String>,
    #[serde(default)]
    pub pending_data: Entities,
}

#[derive(Debug, Deserialize)]
pub struct IsExpectingInputParams {
    pub user_id: String,
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct BotResponseParams {
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub meta: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TaskResultParams {
    pub user_id: String,
    pub action: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Deserialize)]
pub struct ClearCacheParams {
    /// Also reset hit and miss counters
    #[serde(default)]
    pub reset_stats: bool,
}

/// Response of the context write tools.
#[derive(Debug, Serialize)]
struct ContextSummary {
    user_id: String,
    current_flow: Option<ConversationFlow>,
    expecting_input: Vec<InputCategory>,
    history_length: usize,
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_route(state: &SharedState, arguments: Option<Value>) -> RpcResult<Value> {
    execute_handler("route", arguments, |params: RouteParams| async move {
        require_user("route", &params.user_id)?;
        state
            .router
            .route(
                &params.text,
                &params.user_id,
                params.conversation_history,
                params.options,
            )
            .await
            .map_err(|e| RpcError::ExecutionFailed {
                message: e.to_string(),
            })
    })
    .await
}

async fn handle_get_context(state: &SharedState, arguments: Option<Value>) -> RpcResult<Value> {
    let params: UserParams = parse_arguments("get_context", arguments)?;
    require_user("get_context", &params.user_id)?;
    let context = state.router.context().get_context(&params.user_id).await;
    serde_json::to_value(context).map_err(RpcError::Json)
}

async fn handle_clear_context(state: &SharedState, arguments: Option<Value>) -> RpcResult<Value> {
    let params: UserParams = parse_arguments("clear_context", arguments)?;
    require_user("clear_context", &params.user_id)?;
    let cleared = state.router.context().clear_context(&params.user_id).await;
    Ok(json!({ "user_id": params.user_id, "cleared": cleared }))
}

async fn handle_set_expected_input(
    state: &SharedState,
    arguments: Option<Value>,
) -> RpcResult<Value> {
    let params: SetExpectedInputParams = parse_arguments("set_expected_input", arguments)?;
    require_user("set_expected_input", &params.user_id)?;

    let flow: ConversationFlow = params.flow.parse().map_err(|message| {
        RpcError::InvalidParameters {
            tool_name: "set_expected_input".to_string(),
            message,
        }
    })?;
    let categories = params
        .categories
        .iter()
        .map(|c| c.parse::<InputCategory>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|message| RpcError::InvalidParameters {
            tool_name: "set_expected_input".to_string(),
            message,
        })?;

    let context = state
        .router
        .context()
        .set_expected_input(&params.user_id, flow, &categories, params.pending_data)
        .await;
    summarize(&context)
}

async fn handle_is_expecting_input(
    state: &SharedState,
    arguments: Option<Value>,
) -> RpcResult<Value> {
    let params: IsExpectingInputParams = parse_arguments("is_expecting_input", arguments)?;
    require_user("is_expecting_input", &params.user_id)?;

    let category: InputCategory =
        params
            .category
            .parse()
            .map_err(|message| RpcError::InvalidParameters {
                tool_name: "is_expecting_input".to_string(),
                message,
            })?;
    let expecting = state
        .router
        .context()
        .is_expecting_input(&params.user_id, category)
        .await;
    Ok(json!({ "user_id": params.user_id, "category": category, "expecting": expecting }))
}

async fn handle_clear_expected_input(
    state: &SharedState,
    arguments: Option<Value>,
) -> RpcResult<Value> {
    let params: UserParams = parse_arguments("clear_expected_input", arguments)?;
    require_user("clear_expected_input", &params.user_id)?;
    let context = state
        .router
        .context()
        .clear_expected_input(&params.user_id)
        .await;
    summarize(&context)
}

async fn handle_record_bot_response(
    state: &SharedState,
    arguments: Option<Value>,
) -> RpcResult<Value> {
    let params: BotResponseParams = parse_arguments("record_bot_response", arguments)?;
    require_user("record_bot_response", &params.user_id)?;
    let context = state
        .router
        .context()
        .record_bot_response(&params.user_id, &params.text, params.meta)
        .await;
    summarize(&context)
}

async fn handle_record_task_result(
    state: &SharedState,
    arguments: Option<Value>,
) -> RpcResult<Value> {
    let params: TaskResultParams = parse_arguments("record_task_result", arguments)?;
    require_user("record_task_result", &params.user_id)?;
    let context = state
        .router
        .context()
        .record_task_result(&params.user_id, &params.action, params.input, params.result)
        .await;
    summarize(&context)
}

async fn handle_cache_stats(state: &SharedState) -> RpcResult<Value> {
    serde_json::to_value(state.router.normalizer().get_cache_stats()).map_err(RpcError::Json)
}

async fn handle_clear_cache(state: &SharedState, arguments: Option<Value>) -> RpcResult<Value> {
    let params: ClearCacheParams = match arguments {
        Some(args) => parse_arguments("clear_cache", Some(args))?,
        None => ClearCacheParams { reset_stats: false },
    };

    let normalizer = state.router.normalizer();
    normalizer.clear_cache();
    if params.reset_stats {
        normalizer.initialize_cache_stats();
    }
    serde_json::to_value(normalizer.get_cache_stats()).map_err(RpcError::Json)
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> RpcResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| RpcError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(RpcError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Parse arguments, run the operation and serialize its result.
async fn execute_handler<P, R, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> RpcResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = RpcResult<R>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;
    let result = operation(params).await?;
    serde_json::to_value(result).map_err(RpcError::Json)
}

fn require_user(tool_name: &str, user_id: &str) -> RpcResult<()> {
    if user_id.trim().is_empty() {
        return Err(RpcError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "user_id must not be empty".to_string(),
        });
    }
    Ok(())
}

fn summarize(context: &crate::context::ConversationState) -> RpcResult<Value> {
    let summary = ContextSummary {
        user_id: context.user_id.clone(),
        current_flow: context.current_flow,
        expecting_input: context.expecting_input.iter().copied().collect(),
        history_length: context.history.len(),
    };
    serde_json::to_value(summary).map_err(RpcError::Json)
}
