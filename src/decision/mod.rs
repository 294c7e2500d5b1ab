//! Decision controller.
//!
//! Arbitrates between the pattern and AI analyzers with an ordered rule
//! chain. Rules are evaluated in priority order and the first predicate that
//! holds decides the outcome:
//!
//! | Rule | Condition                                   | Outcome |
//! |------|---------------------------------------------|---------|
//! | P1   | mood indicators conflict with a regex action | AI      |
//! | P2   | AI found temporal clues                      | AI      |
//! | P3   | complete AI reasoning, confident enough      | AI      |
//! | P4   | strong regex match                           | regex   |
//! | P5   | always                                       | AI, or fallback when degraded or below the floor |

mod mood;

#[cfg(test)]
#[path = "decision_tests.rs"]
mod decision_tests;

pub use mood::{LexiconConflictDetector, MoodConflictDetector};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::{AiAnalysisResult, Entities, RegexAnalysisResult, UNKNOWN_INTENT};
use crate::config::DecisionConfig;
use crate::context::{ConversationState, EntityKind};
use crate::normalizer::MappingSource;

/// Clarification prompt returned with fallback decisions.
pub const FALLBACK_SUGGESTION: &str =
    "抱歉，我不太確定您的意思。請問您是想記錄課程、查詢課表，還是修改或取消課程呢？";

/// Identifier of a rule in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    P1,
    P2,
    P3,
    P4,
    P5,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::P1 => "P1",
            RuleId::P2 => "P2",
            RuleId::P3 => "P3",
            RuleId::P4 => "P4",
            RuleId::P5 => "P5",
        }
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which analyzer the final decision trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Ai,
    Regex,
    Fallback,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Ai => "ai",
            DecisionSource::Regex => "regex",
            DecisionSource::Fallback => "fallback",
        }
    }
}

/// What a rule does when its predicate holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    TrustAi,
    TrustRegex,
    /// Trust AI unless its confidence is under the fallback threshold.
    Conservative,
}

/// Everything a rule predicate may look at.
pub struct RuleInput<'a> {
    pub regex: &'a RegexAnalysisResult,
    pub ai: &'a AiAnalysisResult,
    pub config: &'a DecisionConfig,
    pub mood: &'a dyn MoodConflictDetector,
}

/// One (predicate, outcome) entry of the chain.
#[derive(Clone, Copy)]
pub struct DecisionRule {
    pub id: RuleId,
    pub description: &'static str,
    pub predicate: fn(&RuleInput<'_>) -> bool,
    pub outcome: RuleOutcome,
}

impl std::fmt::Debug for DecisionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionRule")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// The fixed priority chain.
pub fn default_rules() -> Vec<DecisionRule> {
    vec![
        DecisionRule {
            id: RuleId::P1,
            description: "mood indicators conflict with a regex action intent",
            predicate: |input| {
                !input.ai.evidence.mood_indicators.is_empty()
                    && input.mood.conflicts(&input.regex.intent, &input.ai.evidence)
            },
            outcome: RuleOutcome::TrustAi,
        },
        DecisionRule {
            id: RuleId::P2,
            description: "temporal clues present",
            predicate: |input| !input.ai.evidence.temporal_clues.is_empty(),
            outcome: RuleOutcome::TrustAi,
        },
        DecisionRule {
            id: RuleId::P3,
            description: "AI reasoning complete and confident",
            predicate: |input| {
                input.ai.reasoning_chain.is_complete()
                    && input.ai.confidence.overall >= input.config.ai_confidence_threshold
            },
            outcome: RuleOutcome::TrustAi,
        },
        DecisionRule {
            id: RuleId::P4,
            description: "regex strong match",
            predicate: |input| {
                input.regex.match_details.pattern_strength >= input.config.regex_strength_threshold
            },
            outcome: RuleOutcome::TrustRegex,
        },
        conservative_rule(),
    ]
}

fn conservative_rule() -> DecisionRule {
    DecisionRule {
        id: RuleId::P5,
        description: "default conservative",
        predicate: |_| true,
        outcome: RuleOutcome::Conservative,
    }
}

/// One evaluated rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub rule: RuleId,
    pub matched: bool,
    pub detail: String,
}

/// Raw inputs and the evaluation trace, attached in debug mode only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub regex_result: RegexAnalysisResult,
    pub ai_result: AiAnalysisResult,
    pub trace: Vec<RuleEvaluation>,
    pub elapsed_ms: u64,
}

/// The single decision produced per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticDecisionResult {
    pub decision_id: String,
    pub final_intent: String,
    pub source: DecisionSource,
    pub reason: String,
    pub used_rule: RuleId,
    pub confidence: f64,
    /// Present only for fallback decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub entities: Entities,
    /// Filled once the intent has been normalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_source: Option<MappingSource>,
    /// Entity keys filled from recently mentioned entities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolved_from_context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
}

/// Entity kinds filled from context when the message refers back.
const ANAPHORA_KINDS: [EntityKind; 2] = [EntityKind::Course, EntityKind::Student];

/// Applies the rule chain.
#[derive(Clone)]
pub struct DecisionController {
    rules: Vec<DecisionRule>,
    mood: Arc<dyn MoodConflictDetector>,
}

impl Default for DecisionController {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionController {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
            mood: Arc::new(LexiconConflictDetector::default()),
        }
    }

    /// Replace the mood-conflict predicate used by P1.
    pub fn with_mood_detector(mut self, mood: Arc<dyn MoodConflictDetector>) -> Self {
        self.mood = mood;
        self
    }

    pub fn rules(&self) -> &[DecisionRule] {
        &self.rules
    }

    /// Pick one decision from both analyzer results.
    ///
    /// Never fails: P5 always holds, so the chain always terminates.
    pub fn decide(
        &self,
        regex: &RegexAnalysisResult,
        ai: &AiAnalysisResult,
        context: Option<&ConversationState>,
        config: &DecisionConfig,
    ) -> SemanticDecisionResult {
        let start = Instant::now();
        let input = RuleInput {
            regex,
            ai,
            config,
            mood: self.mood.as_ref(),
        };

        let mut trace = Vec::with_capacity(self.rules.len());
        let mut fired = None;
        for rule in &self.rules {
            let matched = (rule.predicate)(&input);
            trace.push(RuleEvaluation {
                rule: rule.id,
                matched,
                detail: evaluation_detail(rule.id, &input),
            });
            if matched {
                fired = Some(*rule);
                break;
            }
        }

        // P5 always matches
        let rule = fired.unwrap_or_else(conservative_rule);

        let source = match rule.outcome {
            RuleOutcome::TrustAi => DecisionSource::Ai,
            RuleOutcome::TrustRegex => DecisionSource::Regex,
            // A degraded AI result is never trusted, whatever the floor
            RuleOutcome::Conservative
                if ai.is_degraded() || ai.confidence.overall < config.fallback_threshold =>
            {
                DecisionSource::Fallback
            }
            RuleOutcome::Conservative => DecisionSource::Ai,
        };

        let (final_intent, confidence, suggestion) = match source {
            DecisionSource::Ai => (ai.intent.clone(), ai.confidence.overall, None),
            DecisionSource::Regex => (
                regex.intent.clone(),
                regex.match_details.pattern_strength,
                None,
            ),
            DecisionSource::Fallback => (
                UNKNOWN_INTENT.to_string(),
                ai.confidence.overall,
                Some(FALLBACK_SUGGESTION.to_string()),
            ),
        };

        let (primary, secondary) = match source {
            DecisionSource::Regex => (&regex.entities, &ai.entities),
            DecisionSource::Ai | DecisionSource::Fallback => (&ai.entities, &regex.entities),
        };
        let mut entities = if primary.is_empty() {
            secondary.clone()
        } else {
            primary.clone()
        };

        let resolved_from_context = match context {
            Some(state) if refers_back(regex) => resolve_anaphora(&mut entities, state),
            _ => Vec::new(),
        };

        let reason = format!("{}: {}", rule.id, rule.description);

        info!(
            rule = %rule.id,
            source = source.as_str(),
            intent = %final_intent,
            confidence,
            resolved = resolved_from_context.len(),
            "Decision made"
        );

        let debug_info = config.debug.then(|| DebugInfo {
            regex_result: regex.clone(),
            ai_result: ai.clone(),
            trace,
            elapsed_ms: start.elapsed().as_millis() as u64,
        });

        SemanticDecisionResult {
            decision_id: Uuid::new_v4().to_string(),
            final_intent,
            source,
            reason,
            used_rule: rule.id,
            confidence: confidence.clamp(0.0, 1.0),
            suggestion,
            entities,
            mapping_source: None,
            resolved_from_context,
            debug_info,
        }
    }
}

fn evaluation_detail(rule: RuleId, input: &RuleInput<'_>) -> String {
    match rule {
        RuleId::P1 => format!(
            "mood_indicators={:?} regex_intent={}",
            input.ai.evidence.mood_indicators, input.regex.intent
        ),
        RuleId::P2 => format!("temporal_clues={:?}", input.ai.evidence.temporal_clues),
        RuleId::P3 => format!(
            "chain_steps={} overall={:.2} threshold={:.2}",
            input.ai.reasoning_chain.step_count(),
            input.ai.confidence.overall,
            input.config.ai_confidence_threshold
        ),
        RuleId::P4 => format!(
            "pattern_strength={:.2} threshold={:.2}",
            input.regex.match_details.pattern_strength,
            input.config.regex_strength_threshold
        ),
        RuleId::P5 => format!(
            "overall={:.2} fallback_threshold={:.2} ai_degraded={}",
            input.ai.confidence.overall,
            input.config.fallback_threshold,
            input.ai.is_degraded()
        ),
    }
}

/// Whether the message leans on earlier turns for its subject.
fn refers_back(regex: &RegexAnalysisResult) -> bool {
    !regex.match_details.ambiguous_terms.is_empty()
}

/// Fill missing course/student slots from the most recent mentions.
fn resolve_anaphora(entities: &mut Entities, state: &ConversationState) -> Vec<String> {
    let mut filled = Vec::new();
    for kind in ANAPHORA_KINDS {
        let key = kind.entity_key();
        if entities.contains_key(key) {
            continue;
        }
        if let Some(value) = state.mentioned_entities.get(kind).most_recent() {
            debug!(key, value, "Resolved reference from context");
            entities.insert(key.to_string(), serde_json::Value::String(value.to_string()));
            filled.push(key.to_string());
        }
    }
    filled
}
