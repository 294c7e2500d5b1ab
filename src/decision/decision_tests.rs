use super::*;
use crate::analysis::{Confidence, Evidence, ReasoningChain};
use pretty_assertions::assert_eq;
use serde_json::json;

fn regex(intent: &str, strength: f64) -> RegexAnalysisResult {
    let mut result = RegexAnalysisResult::unmatched();
    result.intent = intent.to_string();
    result.match_details.pattern_strength = strength;
    result
}

fn ai(intent: &str, overall: f64) -> AiAnalysisResult {
    AiAnalysisResult {
        intent: intent.to_string(),
        entities: Entities::new(),
        evidence: Evidence::default(),
        reasoning_chain: ReasoningChain::default(),
        confidence: Confidence {
            overall,
            intent_certainty: overall,
            context_understanding: overall,
        },
        degraded: None,
    }
}

fn complete_chain() -> ReasoningChain {
    ReasoningChain {
        step1: Some("a".into()),
        step2: Some("b".into()),
        step3: Some("c".into()),
        step4: Some("d".into()),
        step5: Some("e".into()),
        confidence_source: "explicit".into(),
    }
}

fn decide(regex: &RegexAnalysisResult, ai: &AiAnalysisResult) -> SemanticDecisionResult {
    DecisionController::new().decide(regex, ai, None, &DecisionConfig::default())
}

#[test]
fn test_p1_mood_conflict_trusts_ai() {
    let mut ai_result = ai("query_schedule", 0.1);
    ai_result.evidence.mood_indicators = vec!["好像".into()];
    ai_result.evidence.temporal_clues = vec!["明天".into()];

    let result = decide(&regex("record_course", 1.0), &ai_result);
    assert_eq!(result.used_rule, RuleId::P1);
    assert_eq!(result.source, DecisionSource::Ai);
    assert_eq!(result.final_intent, "query_schedule");
}

#[test]
fn test_mood_without_conflict_falls_through() {
    let mut ai_result = ai("record_course", 0.1);
    ai_result.evidence.mood_indicators = vec!["開心".into()];

    let result = decide(&regex("record_course", 0.9), &ai_result);
    assert_eq!(result.used_rule, RuleId::P4);
}

#[test]
fn test_p2_temporal_clues_trust_ai() {
    let mut ai_result = ai("query_schedule", 0.05);
    ai_result.evidence.temporal_clues = vec!["下週".into()];

    let result = decide(&regex("record_course", 1.0), &ai_result);
    assert_eq!(result.used_rule, RuleId::P2);
    assert_eq!(result.source, DecisionSource::Ai);
    assert_eq!(result.suggestion, None);
}

#[test]
fn test_p3_requires_complete_chain_and_threshold() {
    let mut ai_result = ai("modify_course", 0.3);
    ai_result.reasoning_chain = complete_chain();
    let result = decide(&regex("unknown", 0.0), &ai_result);
    assert_eq!(result.used_rule, RuleId::P3);
    assert_eq!(result.confidence, 0.3);

    ai_result.reasoning_chain.step4 = None;
    let result = decide(&regex("unknown", 0.0), &ai_result);
    assert_eq!(result.used_rule, RuleId::P5);
}

#[test]
fn test_p4_regex_strong_match() {
    let result = decide(
        &regex("record_course", 0.7),
        &AiAnalysisResult::degraded("timeout"),
    );
    assert_eq!(result.used_rule, RuleId::P4);
    assert_eq!(result.source, DecisionSource::Regex);
    assert_eq!(result.final_intent, "record_course");
    assert_eq!(result.confidence, 0.7);
}

#[test]
fn test_p5_trusts_ai_above_floor() {
    let result = decide(&regex("unknown", 0.2), &ai("greeting", 0.25));
    assert_eq!(result.used_rule, RuleId::P5);
    assert_eq!(result.source, DecisionSource::Ai);
    assert_eq!(result.final_intent, "greeting");
}

#[test]
fn test_p5_fallback_below_floor() {
    let result = decide(&regex("unknown", 0.2), &AiAnalysisResult::degraded("parse"));
    assert_eq!(result.used_rule, RuleId::P5);
    assert_eq!(result.source, DecisionSource::Fallback);
    assert_eq!(result.final_intent, UNKNOWN_INTENT);
    assert_eq!(result.suggestion.as_deref(), Some(FALLBACK_SUGGESTION));
}

#[test]
fn test_p5_degraded_ai_falls_back_with_zero_floor() {
    let config = DecisionConfig {
        fallback_threshold: 0.0,
        ..DecisionConfig::default()
    };
    let result = DecisionController::new().decide(
        &regex("unknown", 0.0),
        &AiAnalysisResult::degraded("timeout"),
        None,
        &config,
    );
    assert_eq!(result.used_rule, RuleId::P5);
    assert_eq!(result.source, DecisionSource::Fallback);
    assert_eq!(result.suggestion.as_deref(), Some(FALLBACK_SUGGESTION));

    // A healthy zero-confidence answer still clears a zero floor
    let result = DecisionController::new().decide(
        &regex("unknown", 0.0),
        &ai("greeting", 0.0),
        None,
        &config,
    );
    assert_eq!(result.source, DecisionSource::Ai);
    assert_eq!(result.final_intent, "greeting");
}

#[test]
fn test_entities_fall_back_to_other_source() {
    let mut regex_result = regex("record_course", 0.9);
    regex_result
        .entities
        .insert("course_name".into(), json!("數學"));
    let mut ai_result = ai("record_course", 0.9);
    ai_result.evidence.temporal_clues = vec!["明天".into()];

    // AI wins via P2 but reported no entities
    let result = decide(&regex_result, &ai_result);
    assert_eq!(result.source, DecisionSource::Ai);
    assert_eq!(result.entities["course_name"], json!("數學"));
}

#[test]
fn test_selected_entities_win_when_present() {
    let mut regex_result = regex("record_course", 0.9);
    regex_result
        .entities
        .insert("course_name".into(), json!("數學"));
    let mut ai_result = ai("record_course", 0.1);
    ai_result.entities.insert("course_name".into(), json!("英文"));

    let result = decide(&regex_result, &ai_result);
    assert_eq!(result.source, DecisionSource::Regex);
    assert_eq!(result.entities["course_name"], json!("數學"));
}

#[test]
fn test_anaphora_fills_from_context() {
    let mut state = ConversationState::new("u1");
    let mut mentioned = Entities::new();
    mentioned.insert("course_name".into(), json!("鋼琴"));
    mentioned.insert("student_name".into(), json!("小明"));
    state.mentioned_entities.remember(&mentioned, 10);

    let mut regex_result = regex("cancel_course", 0.9);
    regex_result.match_details.ambiguous_terms = vec!["那堂".into()];

    let result = DecisionController::new().decide(
        &regex_result,
        &AiAnalysisResult::degraded("timeout"),
        Some(&state),
        &DecisionConfig::default(),
    );
    assert_eq!(result.entities["course_name"], json!("鋼琴"));
    assert_eq!(result.entities["student_name"], json!("小明"));
    assert_eq!(
        result.resolved_from_context,
        vec!["course_name".to_string(), "student_name".to_string()]
    );
}

#[test]
fn test_no_anaphora_without_reference() {
    let mut state = ConversationState::new("u1");
    let mut mentioned = Entities::new();
    mentioned.insert("course_name".into(), json!("鋼琴"));
    state.mentioned_entities.remember(&mentioned, 10);

    let result = DecisionController::new().decide(
        &regex("query_schedule", 0.9),
        &AiAnalysisResult::degraded("timeout"),
        Some(&state),
        &DecisionConfig::default(),
    );
    assert!(result.resolved_from_context.is_empty());
    assert!(!result.entities.contains_key("course_name"));
}

#[test]
fn test_debug_info_only_when_requested() {
    let result = decide(&regex("record_course", 1.0), &ai("record_course", 0.0));
    assert!(result.debug_info.is_none());

    let config = DecisionConfig {
        debug: true,
        ..DecisionConfig::default()
    };
    let result = DecisionController::new().decide(
        &regex("record_course", 1.0),
        &ai("record_course", 0.0),
        None,
        &config,
    );
    let debug = result.debug_info.unwrap();
    let evaluated: Vec<_> = debug.trace.iter().map(|e| (e.rule, e.matched)).collect();
    assert_eq!(
        evaluated,
        vec![
            (RuleId::P1, false),
            (RuleId::P2, false),
            (RuleId::P3, false),
            (RuleId::P4, true),
        ]
    );
}

#[test]
fn test_custom_mood_detector() {
    struct AlwaysConflict;
    impl MoodConflictDetector for AlwaysConflict {
        fn conflicts(&self, _: &str, _: &Evidence) -> bool {
            true
        }
    }

    let mut ai_result = ai("greeting", 0.5);
    ai_result.evidence.mood_indicators = vec!["開心".into()];
    let result = DecisionController::new()
        .with_mood_detector(Arc::new(AlwaysConflict))
        .decide(
            &regex("greeting", 1.0),
            &ai_result,
            None,
            &DecisionConfig::default(),
        );
    assert_eq!(result.used_rule, RuleId::P1);
}

#[test]
fn test_result_serialization() {
    let result = decide(&regex("record_course", 1.0), &ai("record_course", 0.0));
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["source"], "regex");
    assert_eq!(value["used_rule"], "P4");
    assert!(value.get("suggestion").is_none());
    assert!(Uuid::parse_str(value["decision_id"].as_str().unwrap()).is_ok());
}
