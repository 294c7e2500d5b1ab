//! LLM-backed intent analysis with timeout and response validation.

use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{AiAnalysisResult, Confidence, Entities, Evidence, ReasoningChain};
use crate::context::{HistoryEntry, HistoryRole};
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::llm::{CompletionParams, LlmClient, Message};
use crate::prompts::INTENT_ANALYSIS_PROMPT;

/// Response shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct AiResponse {
    intent: String,
    #[serde(default)]
    entities: Option<Entities>,
    #[serde(default)]
    evidence: Option<Evidence>,
    #[serde(default)]
    reasoning_chain: Option<ReasoningChain>,
    confidence: Confidence,
}

/// Analyzer that delegates understanding to the LLM collaborator.
///
/// Owns only the request payload, the timeout and validation of the reply.
/// [`AiAnalyzer::analyze`] never fails: timeouts and bad replies degrade to a
/// zero-confidence result so the decision chain can run on regex alone.
#[derive(Clone)]
pub struct AiAnalyzer {
    client: Arc<dyn LlmClient>,
    params: CompletionParams,
    timeout: Duration,
    history_turns: usize,
}

impl AiAnalyzer {
    /// Create an analyzer with the given timeout and history window.
    pub fn new(client: Arc<dyn LlmClient>, timeout_ms: u64, history_turns: usize) -> Self {
        Self {
            client,
            params: CompletionParams::default(),
            timeout: Duration::from_millis(timeout_ms),
            history_turns,
        }
    }

    /// Override the completion parameters (pipe, variables).
    pub fn with_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self
    }

    /// Analyze `text`, absorbing every failure into a degraded result.
    pub async fn analyze(&self, text: &str, history: &[HistoryEntry]) -> AiAnalysisResult {
        match self.try_analyze(text, history).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "AI analysis degraded to zero confidence");
                AiAnalysisResult::degraded(e.to_string())
            }
        }
    }

    /// Analyze `text`, surfacing timeout and parse failures.
    pub async fn try_analyze(
        &self,
        text: &str,
        history: &[HistoryEntry],
    ) -> AnalyzerResult<AiAnalysisResult> {
        let start = Instant::now();
        let messages = self.build_messages(text, history);

        debug!(
            messages = messages.len(),
            timeout_ms = self.timeout.as_millis(),
            "Requesting AI analysis"
        );

        let completion = tokio::time::timeout(self.timeout, self.client.complete(&messages, &self.params))
            .await
            .map_err(|_| AnalyzerError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        let result = parse_ai_response(&completion.content)?;

        info!(
            intent = %result.intent,
            confidence = result.confidence.overall,
            model = completion.model.as_deref().unwrap_or("unknown"),
            latency_ms = start.elapsed().as_millis(),
            "AI analysis completed"
        );

        Ok(result)
    }

    /// System prompt, the recent turns, then the message itself.
    fn build_messages(&self, text: &str, history: &[HistoryEntry]) -> Vec<Message> {
        let start = history.len().saturating_sub(self.history_turns);
        let mut messages = Vec::with_capacity(history.len() - start + 2);

        messages.push(Message::system(INTENT_ANALYSIS_PROMPT));
        for entry in &history[start..] {
            let message = match entry.role {
                HistoryRole::User => Message::user(entry.as_text()),
                HistoryRole::Bot => Message::assistant(entry.as_text()),
                HistoryRole::Task => Message::assistant(format!("(task) {}", entry.as_text())),
            };
            messages.push(message);
        }
        messages.push(Message::user(text));

        messages
    }
}

/// Parse and validate a completion into an [`AiAnalysisResult`].
pub fn parse_ai_response(content: &str) -> AnalyzerResult<AiAnalysisResult> {
    let json = extract_json_from_completion(content)
        .map_err(|message| AnalyzerError::Parse { message })?;

    let response: AiResponse = serde_json::from_str(json).map_err(|e| {
        let preview: String = content.chars().take(200).collect();
        AnalyzerError::Parse {
            message: format!("JSON parse error: {} | Response preview: {}", e, preview),
        }
    })?;

    let intent = response.intent.trim();
    if intent.is_empty() {
        return Err(AnalyzerError::Parse {
            message: "intent is empty".to_string(),
        });
    }
    if !response.confidence.is_valid() {
        return Err(AnalyzerError::Parse {
            message: format!("confidence out of range: {:?}", response.confidence),
        });
    }

    Ok(AiAnalysisResult {
        intent: intent.to_string(),
        entities: response.entities.unwrap_or_default(),
        evidence: response.evidence.unwrap_or_default(),
        reasoning_chain: response.reasoning_chain.unwrap_or_default(),
        confidence: response.confidence,
        degraded: None,
    })
}

/// Extract JSON from a completion string, handling markdown code blocks.
fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::UNKNOWN_INTENT;
    use crate::error::LlmError;
    use crate::llm::{Completion, MockLlmClient};
    use serde_json::json;

    fn full_response() -> String {
        json!({
            "intent": "record_course",
            "entities": {"course_name": "數學", "date": "明天"},
            "evidence": {
                "temporal_clues": ["明天"],
                "mood_indicators": [],
                "action_verbs": ["記錄"],
                "question_markers": []
            },
            "reasoning_chain": {
                "step1": "a", "step2": "b", "step3": "c", "step4": "d", "step5": "e",
                "confidence_source": "explicit verb"
            },
            "confidence": {"overall": 0.92, "intent_certainty": 0.9, "context_understanding": 0.8}
        })
        .to_string()
    }

    fn completion(content: String) -> Completion {
        Completion {
            content,
            usage: None,
            model: Some("test-model".to_string()),
        }
    }

    #[test]
    fn test_parse_full_response() {
        let result = parse_ai_response(&full_response()).unwrap();
        assert_eq!(result.intent, "record_course");
        assert_eq!(result.evidence.temporal_clues, vec!["明天".to_string()]);
        assert!(result.reasoning_chain.is_complete());
        assert!(!result.is_degraded());
    }

    #[test]
    fn test_parse_fenced_response() {
        let content = format!("Here you go:\n```json\n{}\n```", full_response());
        assert!(parse_ai_response(&content).is_ok());
    }

    #[test]
    fn test_parse_missing_optional_sections() {
        let content = r#"{"intent":"greeting","confidence":{"overall":0.5,"intent_certainty":0.5,"context_understanding":0.5}}"#;
        let result = parse_ai_response(content).unwrap();
        assert!(result.evidence.is_empty());
        assert!(result.entities.is_empty());
        assert_eq!(result.reasoning_chain.step_count(), 0);
    }

    #[test]
    fn test_parse_rejects_out_of_range_confidence() {
        let content = r#"{"intent":"greeting","confidence":{"overall":1.5,"intent_certainty":0.5,"context_understanding":0.5}}"#;
        assert!(matches!(
            parse_ai_response(content),
            Err(AnalyzerError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(matches!(
            parse_ai_response("I think the user wants to add a class."),
            Err(AnalyzerError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_analyze_success() {
        let mut client = MockLlmClient::new();
        let body = full_response();
        client
            .expect_complete()
            .times(1)
            .returning(move |_, _| Ok(completion(body.clone())));

        let analyzer = AiAnalyzer::new(Arc::new(client), 1000, 6);
        let result = analyzer.analyze("明天記錄數學課", &[]).await;
        assert_eq!(result.intent, "record_course");
        assert!((result.confidence.overall - 0.92).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_analyze_sends_bounded_history() {
        let mut client = MockLlmClient::new();
        let body = full_response();
        client
            .expect_complete()
            .withf(|prompt, _| {
                // system + 2 history turns + the message
                prompt.len() == 4
                    && prompt[1].content == "turn 3"
                    && prompt[3].content == "明天記錄數學課"
            })
            .returning(move |_, _| Ok(completion(body.clone())));

        let history: Vec<HistoryEntry> = (0..5)
            .map(|i| HistoryEntry::user(format!("turn {}", i)))
            .collect();
        let analyzer = AiAnalyzer::new(Arc::new(client), 1000, 2);
        let result = analyzer.analyze("明天記錄數學課", &history).await;
        assert!(!result.is_degraded());
    }

    #[tokio::test]
    async fn test_analyze_degrades_on_parse_error() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .returning(|_, _| Ok(completion("not json".to_string())));

        let analyzer = AiAnalyzer::new(Arc::new(client), 1000, 6);
        let result = analyzer.analyze("hello", &[]).await;
        assert!(result.is_degraded());
        assert_eq!(result.intent, UNKNOWN_INTENT);
        assert_eq!(result.confidence.overall, 0.0);
        assert!(result.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_degrades_on_llm_error() {
        let mut client = MockLlmClient::new();
        client
            .expect_complete()
            .returning(|_, _| Err(LlmError::Api { status: 500, message: "boom".into() }));

        let analyzer = AiAnalyzer::new(Arc::new(client), 1000, 6);
        let err = analyzer.try_analyze("hello", &[]).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Llm(_)));
        assert!(analyzer.analyze("hello", &[]).await.is_degraded());
    }
}
