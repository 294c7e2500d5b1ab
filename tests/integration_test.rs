//! Full-stack integration tests
//!
//! Runs tool calls through the JSON-RPC server with a mocked completion
//! endpoint (wiremock) and a SQLite conversation store in a temp directory.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use semantic_course_router::config::{
    Config, ContextConfig, DatabaseConfig, DecisionConfig, LlmConfig, LogFormat, LoggingConfig,
    NormalizerConfig, RequestConfig,
};
use semantic_course_router::llm::LangbaseClient;
use semantic_course_router::server::{
    handle_tool_call, AppState, JsonRpcRequest, McpServer, SharedState,
};
use semantic_course_router::storage::SqliteKvStore;

fn create_test_config(mock_url: &str, db_path: std::path::PathBuf) -> Config {
    Config {
        llm: LlmConfig {
            api_key: "test-key".to_string(),
            base_url: mock_url.to_string(),
            pipe: "course-intent-analyzer-v1".to_string(),
        },
        database: DatabaseConfig {
            path: db_path,
            max_connections: 2,
        },
        logging: LoggingConfig {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        },
        request: RequestConfig {
            timeout_ms: 2000,
            max_retries: 0,
            retry_delay_ms: 10,
        },
        decision: DecisionConfig::default(),
        normalizer: NormalizerConfig::default(),
        context: ContextConfig::default(),
    }
}

async fn create_state(mock_server: &MockServer, dir: &TempDir) -> SharedState {
    let config = create_test_config(&mock_server.uri(), dir.path().join("conversation.db"));
    state_from_config(config).await
}

async fn state_from_config(config: Config) -> SharedState {
    let kv = SqliteKvStore::new(&config.database).await.unwrap();
    let llm = LangbaseClient::new(&config.llm, config.request.within_budget()).unwrap();
    Arc::new(AppState::new(config, Arc::new(llm), Arc::new(kv)))
}

fn pipe_response(completion: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "completion": completion.to_string(),
        "raw": {"model": "gpt-4o-mini"}
    }))
}

fn analysis(intent: &str, entities: Value, temporal: &[&str]) -> Value {
    json!({
        "intent": intent,
        "entities": entities,
        "evidence": {"temporal_clues": temporal},
        "reasoning_chain": {
            "step1": "user wants to add a lesson",
            "step2": "a date is given",
            "step3": "subject is math",
            "step4": "no conflicts",
            "step5": intent
        },
        "confidence": {"overall": 0.88, "intent_certainty": 0.9, "context_understanding": 0.85}
    })
}

#[tokio::test]
async fn test_route_with_ai_and_persisted_context() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(pipe_response(analysis(
            "add_course",
            json!({"course": "數學", "date": "明天"}),
            &["明天"],
        )))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let state = create_state(&mock_server, &dir).await;

    let decision = handle_tool_call(
        &state,
        "route",
        Some(json!({"text": "明天上數學課", "user_id": "teacher-1"})),
    )
    .await
    .unwrap();

    assert_eq!(decision["final_intent"], "record_course");
    assert_eq!(decision["source"], "ai");
    assert_eq!(decision["used_rule"], "P2");
    assert_eq!(decision["mapping_source"], "precomputed_direct");
    assert_eq!(decision["entities"]["course_name"], "數學");

    let context = handle_tool_call(&state, "get_context", Some(json!({"user_id": "teacher-1"})))
        .await
        .unwrap();
    let history = context["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["intent"], "record_course");
}

#[tokio::test]
async fn test_upstream_failure_degrades_to_regex() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let state = create_state(&mock_server, &dir).await;

    let decision = handle_tool_call(
        &state,
        "route",
        Some(json!({"text": "取消明天的數學課", "user_id": "u1", "options": {"debug": true}})),
    )
    .await
    .unwrap();

    assert_eq!(decision["final_intent"], "cancel_course");
    assert_eq!(decision["source"], "regex");
    assert_eq!(decision["entities"]["course_name"], "數學");
    assert!(decision["debug_info"]["ai_result"]["degraded"].is_string());
}

#[tokio::test]
async fn test_client_retry_completes_inside_analyzer_budget() {
    let mock_server = MockServer::start().await;
    // First attempt stalls past its share of the budget, the retry answers
    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(
            pipe_response(analysis("add_course", json!({"course": "數學"}), &[]))
                .set_delay(Duration::from_millis(800)),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(pipe_response(analysis(
            "add_course",
            json!({"course": "數學"}),
            &[],
        )))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&mock_server.uri(), dir.path().join("conversation.db"));
    config.request = RequestConfig {
        timeout_ms: 1000,
        max_retries: 1,
        retry_delay_ms: 10,
    };
    let state = state_from_config(config).await;

    let decision = handle_tool_call(
        &state,
        "route",
        Some(json!({"text": "我想上數學", "user_id": "u1", "options": {"debug": true}})),
    )
    .await
    .unwrap();

    assert_eq!(decision["source"], "ai");
    assert_eq!(decision["final_intent"], "record_course");
    assert!(decision["debug_info"]["ai_result"]["degraded"].is_null());
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_flow_tools_round_trip() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let state = create_state(&mock_server, &dir).await;

    let summary = handle_tool_call(
        &state,
        "set_expected_input",
        Some(json!({
            "user_id": "u1",
            "flow": "course_creation",
            "categories": ["time", "confirmation"],
            "pending_data": {"course_name": "鋼琴"}
        })),
    )
    .await
    .unwrap();
    assert_eq!(summary["current_flow"], "course_creation");
    assert_eq!(summary["expecting_input"], json!(["confirmation", "time"]));

    let expecting = handle_tool_call(
        &state,
        "is_expecting_input",
        Some(json!({"user_id": "u1", "category": "time"})),
    )
    .await
    .unwrap();
    assert_eq!(expecting["expecting"], true);

    handle_tool_call(
        &state,
        "record_task_result",
        Some(json!({
            "user_id": "u1",
            "action": "record_course",
            "input": {"course_name": "鋼琴"},
            "result": {"id": 7}
        })),
    )
    .await
    .unwrap();

    let summary = handle_tool_call(&state, "clear_expected_input", Some(json!({"user_id": "u1"})))
        .await
        .unwrap();
    assert_eq!(summary["current_flow"], Value::Null);
    assert_eq!(summary["history_length"], 1);

    let cleared = handle_tool_call(&state, "clear_context", Some(json!({"user_id": "u1"})))
        .await
        .unwrap();
    assert_eq!(cleared["cleared"], true);
}

#[tokio::test]
async fn test_invalid_flow_is_rejected() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let state = create_state(&mock_server, &dir).await;

    let result = handle_tool_call(
        &state,
        "set_expected_input",
        Some(json!({"user_id": "u1", "flow": "time_travel", "categories": []})),
    )
    .await;
    assert!(result.unwrap_err().to_string().contains("Unknown conversation flow"));
}

#[tokio::test]
async fn test_server_tools_call_and_cache_stats() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let state = create_state(&mock_server, &dir).await;
    let server = McpServer::new(state);

    let request: JsonRpcRequest = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "route", "arguments": {"text": "記錄課程", "user_id": "u1"}}
    }))
    .unwrap();
    let response = server.handle_request(request).await.unwrap();
    let text = response.result.unwrap()["content"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    let decision: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(decision["final_intent"], "record_course");

    let request: JsonRpcRequest = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": {"name": "cache_stats"}
    }))
    .unwrap();
    let response = server.handle_request(request).await.unwrap();
    let text = response.result.unwrap()["content"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    let stats: Value = serde_json::from_str(&text).unwrap();
    assert!(stats["precomputed_hits"].as_u64().unwrap() >= 1);
    assert!(stats["precomputed_size"].as_u64().unwrap() > 0);
}
