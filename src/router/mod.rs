//! The `route` entry point.
//!
//! Per message: load context, run both analyzers, decide, normalize the
//! decision, then record the user turn.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::analysis::{AiAnalyzer, PatternAnalyzer};
use crate::config::{Config, DecisionConfig};
use crate::context::{ContextStore, HistoryEntry};
use crate::decision::{DecisionController, SemanticDecisionResult};
use crate::error::AppResult;
use crate::llm::{CompletionParams, LlmClient};
use crate::normalizer::SemanticNormalizer;
use crate::storage::KvStore;

/// Per-request overrides of the decision configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteOptions {
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub ai_confidence_threshold: Option<f64>,
    #[serde(default)]
    pub regex_strength_threshold: Option<f64>,
    #[serde(default)]
    pub fallback_threshold: Option<f64>,
}

impl RouteOptions {
    /// Enable debug output for this request
    pub fn debug() -> Self {
        Self {
            debug: Some(true),
            ..Self::default()
        }
    }

    /// Overlay these options on `base`, validating the result.
    pub fn apply(&self, base: &DecisionConfig) -> AppResult<DecisionConfig> {
        let config = DecisionConfig {
            debug: self.debug.unwrap_or(base.debug),
            ai_confidence_threshold: self
                .ai_confidence_threshold
                .unwrap_or(base.ai_confidence_threshold),
            regex_strength_threshold: self
                .regex_strength_threshold
                .unwrap_or(base.regex_strength_threshold),
            fallback_threshold: self.fallback_threshold.unwrap_or(base.fallback_threshold),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Combines the analyzers, the decision controller, the normalizer and the
/// context store behind one call.
#[derive(Clone)]
pub struct SemanticRouter {
    pattern: PatternAnalyzer,
    ai: AiAnalyzer,
    controller: DecisionController,
    normalizer: Arc<SemanticNormalizer>,
    context: ContextStore,
    decision_config: DecisionConfig,
}

impl SemanticRouter {
    pub fn new(
        ai: AiAnalyzer,
        normalizer: Arc<SemanticNormalizer>,
        context: ContextStore,
        decision_config: DecisionConfig,
    ) -> Self {
        Self {
            pattern: PatternAnalyzer::new(),
            ai,
            controller: DecisionController::new(),
            normalizer,
            context,
            decision_config,
        }
    }

    /// Wire every component from loaded configuration.
    pub fn from_config(config: &Config, llm: Arc<dyn LlmClient>, kv: Arc<dyn KvStore>) -> Self {
        let ai = AiAnalyzer::new(
            llm,
            config.request.timeout_ms,
            config.context.ai_history_turns,
        )
        .with_params(CompletionParams::default().with_pipe(config.llm.pipe.clone()));

        Self::new(
            ai,
            Arc::new(SemanticNormalizer::new(config.normalizer.clone())),
            ContextStore::new(kv, config.context.clone()),
            config.decision.clone(),
        )
    }

    /// Replace the decision controller (e.g. a custom mood detector).
    pub fn with_controller(mut self, controller: DecisionController) -> Self {
        self.controller = controller;
        self
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn normalizer(&self) -> &SemanticNormalizer {
        &self.normalizer
    }

    /// Route one user message to a decision.
    ///
    /// `conversation_history` replaces the stored history as the AI
    /// analyzer's input when given. Analyzer failures never surface here;
    /// the only errors are invalid options and unmapped intents in strict
    /// mode.
    pub async fn route(
        &self,
        text: &str,
        user_id: &str,
        conversation_history: Option<Vec<HistoryEntry>>,
        options: Option<RouteOptions>,
    ) -> AppResult<SemanticDecisionResult> {
        let start = Instant::now();
        let config = match &options {
            Some(options) => options.apply(&self.decision_config)?,
            None => self.decision_config.clone(),
        };

        let state = self.context.get_context(user_id).await;
        let history = conversation_history.unwrap_or_else(|| state.history.clone());

        let (regex_result, ai_result) = tokio::join!(
            async { self.pattern.analyze(text) },
            self.ai.analyze(text, &history)
        );

        debug!(
            user_id = %user_id,
            regex_intent = %regex_result.intent,
            pattern_strength = regex_result.match_details.pattern_strength,
            ai_intent = %ai_result.intent,
            ai_confidence = ai_result.confidence.overall,
            ai_degraded = ai_result.is_degraded(),
            "Analyzers completed"
        );

        let mut decision = self
            .controller
            .decide(&regex_result, &ai_result, Some(&state), &config);

        let intent = self.normalizer.normalize_intent(&decision.final_intent)?;
        let entities = self.normalizer.normalize_entities(&decision.entities);
        decision.final_intent = intent.mapped_intent;
        decision.mapping_source = Some(intent.mapping_source);
        decision.entities = entities.entities;

        self.context
            .record_user_message(
                user_id,
                text,
                Some(&decision.final_intent),
                &decision.entities,
            )
            .await;

        info!(
            user_id = %user_id,
            decision_id = %decision.decision_id,
            intent = %decision.final_intent,
            source = decision.source.as_str(),
            rule = %decision.used_rule,
            mapping_source = %intent.mapping_source,
            latency_ms = start.elapsed().as_millis(),
            "Message routed"
        );

        Ok(decision)
    }
}
