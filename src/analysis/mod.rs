//! Intent analyzers and their result shapes.
//!
//! Two independent analyzers read each inbound message:
//! - [`PatternAnalyzer`]: deterministic regex rules, no history, no I/O
//! - [`AiAnalyzer`]: delegates to the LLM collaborator and validates its JSON
//!
//! Their outputs are tagged as [`AnalysisResult`] before they reach the
//! normalizer, so nothing downstream trusts an unvalidated shape.

mod ai;
mod pattern;

pub use ai::*;
pub use pattern::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Intent reported when nothing matched.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Extracted slots keyed by entity name.
pub type Entities = BTreeMap<String, serde_json::Value>;

// ============================================================================
// AI analyzer shapes
// ============================================================================

/// Substrings the model cited as evidence. Empty means none detected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub temporal_clues: Vec<String>,
    #[serde(default)]
    pub mood_indicators: Vec<String>,
    #[serde(default)]
    pub action_verbs: Vec<String>,
    #[serde(default)]
    pub question_markers: Vec<String>,
}

impl Evidence {
    /// True when every list is empty.
    pub fn is_empty(&self) -> bool {
        self.temporal_clues.is_empty()
            && self.mood_indicators.is_empty()
            && self.action_verbs.is_empty()
            && self.question_markers.is_empty()
    }
}

/// Up to five ordered reasoning steps reported by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningChain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step5: Option<String>,
    #[serde(default)]
    pub confidence_source: String,
}

impl ReasoningChain {
    fn steps(&self) -> [&Option<String>; 5] {
        [
            &self.step1,
            &self.step2,
            &self.step3,
            &self.step4,
            &self.step5,
        ]
    }

    /// A chain is complete iff all five steps are present and non-blank.
    pub fn is_complete(&self) -> bool {
        self.steps()
            .iter()
            .all(|s| s.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    /// Number of steps present.
    pub fn step_count(&self) -> usize {
        self.steps().iter().filter(|s| s.is_some()).count()
    }
}

/// Model-reported confidence scores, each within [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub overall: f64,
    pub intent_certainty: f64,
    pub context_understanding: f64,
}

impl Confidence {
    /// Zero on every axis; what a degraded analysis reports.
    pub fn zero() -> Self {
        Self::default()
    }

    /// True when every score lies in [0, 1].
    pub fn is_valid(&self) -> bool {
        [self.overall, self.intent_certainty, self.context_understanding]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}

/// Validated output of the AI analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysisResult {
    pub intent: String,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default)]
    pub reasoning_chain: ReasoningChain,
    pub confidence: Confidence,
    /// Why this result is a zero-confidence stand-in, when it is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl AiAnalysisResult {
    /// Zero-confidence stand-in used when the collaborator failed.
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            intent: UNKNOWN_INTENT.to_string(),
            entities: Entities::new(),
            evidence: Evidence::default(),
            reasoning_chain: ReasoningChain::default(),
            confidence: Confidence::zero(),
            degraded: Some(reason.into()),
        }
    }

    /// True when this result stands in for a failed analysis.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

// ============================================================================
// Pattern analyzer shapes
// ============================================================================

/// How and how strongly the rule table matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchDetails {
    pub triggered_patterns: Vec<String>,
    pub keyword_matches: Vec<String>,
    pub ambiguous_terms: Vec<String>,
    /// Specificity of the match in [0, 1]; grows with more and longer hits.
    pub pattern_strength: f64,
}

/// Declared capability boundary of the pattern analyzer. Always all-true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexLimitations {
    pub context_blind: bool,
    pub temporal_blind: bool,
    pub mood_blind: bool,
}

impl Default for RegexLimitations {
    fn default() -> Self {
        Self {
            context_blind: true,
            temporal_blind: true,
            mood_blind: true,
        }
    }
}

/// Output of the pattern analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexAnalysisResult {
    pub intent: String,
    pub entities: Entities,
    pub match_details: MatchDetails,
    pub limitations: RegexLimitations,
}

impl RegexAnalysisResult {
    /// Result for text no rule matched.
    pub fn unmatched() -> Self {
        Self {
            intent: UNKNOWN_INTENT.to_string(),
            entities: Entities::new(),
            match_details: MatchDetails::default(),
            limitations: RegexLimitations::default(),
        }
    }
}

/// Tagged union of analyzer outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analyzer", rename_all = "snake_case")]
pub enum AnalysisResult {
    Regex(RegexAnalysisResult),
    Ai(AiAnalysisResult),
}

impl AnalysisResult {
    /// Raw intent identifier as the analyzer produced it.
    pub fn intent(&self) -> &str {
        match self {
            AnalysisResult::Regex(r) => &r.intent,
            AnalysisResult::Ai(a) => &a.intent,
        }
    }

    /// Raw entity map as the analyzer produced it.
    pub fn entities(&self) -> &Entities {
        match self {
            AnalysisResult::Regex(r) => &r.entities,
            AnalysisResult::Ai(a) => &a.entities,
        }
    }
}
