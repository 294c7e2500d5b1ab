//! Unit tests for completion wire types.

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_message_constructors() {
    assert_eq!(Message::system("s").role, MessageRole::System);
    assert_eq!(Message::user("u").role, MessageRole::User);
    assert_eq!(Message::assistant("a").role, MessageRole::Assistant);
    assert_eq!(Message::user("記錄課程").content, "記錄課程");
}

#[test]
fn test_message_role_serializes_lowercase() {
    let value = serde_json::to_value(Message::assistant("ok")).unwrap();
    assert_eq!(value, json!({"role": "assistant", "content": "ok"}));
}

#[test]
fn test_pipe_request_omits_empty_variables() {
    let request = PipeRequest::new("intent-v1", vec![Message::user("hi")])
        .with_variables(Default::default());
    let value = serde_json::to_value(&request).unwrap();
    assert!(value.get("variables").is_none());
    assert_eq!(value["stream"], json!(false));
    assert_eq!(value["name"], json!("intent-v1"));
}

#[test]
fn test_pipe_request_with_variables() {
    let params = CompletionParams::default()
        .with_pipe("other")
        .with_variable("locale", "zh-TW");
    let request = PipeRequest::new("intent-v1", vec![]).with_variables(params.variables);
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["variables"]["locale"], json!("zh-TW"));
    assert_eq!(params.pipe.as_deref(), Some("other"));
}

#[test]
fn test_pipe_response_into_completion() {
    let response: PipeResponse = serde_json::from_value(json!({
        "success": true,
        "completion": "{\"intent\":\"record_course\"}",
        "raw": {
            "model": "gpt-4o-mini",
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }
    }))
    .unwrap();

    let completion: Completion = response.into();
    assert_eq!(completion.model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(completion.usage.unwrap().total_tokens, Some(15));
    assert!(completion.content.contains("record_course"));
}

#[test]
fn test_pipe_response_without_raw() {
    let response: PipeResponse =
        serde_json::from_value(json!({"success": true, "completion": ""})).unwrap();
    let completion: Completion = response.into();
    assert!(completion.model.is_none());
    assert!(completion.usage.is_none());
}
