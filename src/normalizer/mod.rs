//! Semantic normalizer.
//!
//! Maps raw intent identifiers and entity keys produced by either analyzer
//! onto the canonical vocabulary. Resolution walks the tiers in priority
//! order and stops at the first hit:
//!
//! 1. precomputed table built from the static aliases
//! 2. lookup cache keyed by the raw value
//! 3. fuzzy cache keyed by the folded value
//! 4. live fuzzy match, memoized into both caches
//!
//! Each normalizer owns its cache; two instances never share statistics.

mod cache;
mod fuzzy;
pub mod tables;

pub use cache::{CacheStats, CachedMapping, MappingKind, NormalizerCache};
pub use fuzzy::{fold_key, levenshtein, similarity, FuzzyMatch, FuzzyMatcher, MatchMethod};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::analysis::{AnalysisResult, Entities};
use crate::config::NormalizerConfig;
use crate::error::NormalizeError;
use tables::{CANONICAL_ENTITY_KEYS, CANONICAL_INTENTS, ENTITY_KEY_ALIASES, INTENT_ALIASES};

/// Tier that produced a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    PrecomputedDirect,
    LookupCache,
    FuzzyCache,
    FuzzyMatch,
    None,
}

impl MappingSource {
    /// Higher is more authoritative.
    pub fn priority(&self) -> u8 {
        match self {
            MappingSource::PrecomputedDirect => 4,
            MappingSource::LookupCache => 3,
            MappingSource::FuzzyCache => 2,
            MappingSource::FuzzyMatch => 1,
            MappingSource::None => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingSource::PrecomputedDirect => "precomputed_direct",
            MappingSource::LookupCache => "lookup_cache",
            MappingSource::FuzzyCache => "fuzzy_cache",
            MappingSource::FuzzyMatch => "fuzzy_match",
            MappingSource::None => "none",
        }
    }
}

impl std::fmt::Display for MappingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one intent normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentMappingResult {
    pub raw_intent: String,
    /// Canonical intent, or the raw value when unmapped in lenient mode.
    pub mapped_intent: String,
    pub mapping_source: MappingSource,
    pub confidence: f64,
}

/// One entity key rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityKeyMapping {
    pub raw_key: String,
    pub mapped_key: String,
    pub mapping_source: MappingSource,
}

/// Outcome of normalizing an entity map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMappingResult {
    pub entities: Entities,
    pub mappings: Vec<EntityKeyMapping>,
    /// Keys with no canonical form, passed through unchanged.
    pub unmapped_keys: Vec<String>,
}

/// Normalized view of one analyzer result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub intent: IntentMappingResult,
    pub entities: EntityMappingResult,
}

struct Resolution {
    mapped: Option<String>,
    source: MappingSource,
    score: f64,
}

/// Canonicalizes analyzer output through the tiered cache.
pub struct SemanticNormalizer {
    cache: NormalizerCache,
    intent_matcher: FuzzyMatcher,
    entity_matcher: FuzzyMatcher,
    config: NormalizerConfig,
}

impl SemanticNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        let mut precomputed = HashMap::new();
        for value in CANONICAL_INTENTS {
            precomputed.insert((MappingKind::Intent, value.to_string()), value.to_string());
        }
        for (alias, target) in INTENT_ALIASES {
            precomputed.insert((MappingKind::Intent, alias.to_string()), target.to_string());
        }
        for value in CANONICAL_ENTITY_KEYS {
            precomputed.insert((MappingKind::Entity, value.to_string()), value.to_string());
        }
        for (alias, target) in ENTITY_KEY_ALIASES {
            precomputed.insert((MappingKind::Entity, alias.to_string()), target.to_string());
        }

        debug!(
            precomputed = precomputed.len(),
            max_cache_size = config.max_cache_size,
            "Normalizer initialized"
        );

        Self {
            cache: NormalizerCache::new(precomputed, config.max_cache_size),
            intent_matcher: FuzzyMatcher::new(CANONICAL_INTENTS, INTENT_ALIASES),
            entity_matcher: FuzzyMatcher::new(CANONICAL_ENTITY_KEYS, ENTITY_KEY_ALIASES),
            config,
        }
    }

    /// Map a raw intent identifier to its canonical form.
    ///
    /// In strict mode an unmapped intent is an error; otherwise it passes
    /// through unchanged with `mapping_source = none`.
    pub fn normalize_intent(&self, raw: &str) -> Result<IntentMappingResult, NormalizeError> {
        let resolution = self.resolve(MappingKind::Intent, raw);

        let mapped_intent = match resolution.mapped {
            Some(mapped) => mapped,
            None if self.config.strict_mode => {
                return Err(NormalizeError::UnmappedIntent {
                    raw: raw.to_string(),
                });
            }
            None => {
                if self.config.log_unmapped {
                    warn!(raw_intent = %raw, "Unmapped intent passed through");
                }
                raw.to_string()
            }
        };

        Ok(IntentMappingResult {
            raw_intent: raw.to_string(),
            mapped_intent,
            mapping_source: resolution.source,
            confidence: resolution.score,
        })
    }

    /// Rewrite entity keys to canonical names. Values are untouched.
    ///
    /// When two raw keys map to the same canonical key, a raw key that is
    /// already canonical wins; otherwise the first in key order wins.
    pub fn normalize_entities(&self, entities: &Entities) -> EntityMappingResult {
        let mut result = EntityMappingResult::default();
        let mut deferred = Vec::new();

        for (raw_key, value) in entities {
            let resolution = self.resolve(MappingKind::Entity, raw_key);
            match resolution.mapped {
                Some(mapped) => {
                    if mapped != *raw_key {
                        result.mappings.push(EntityKeyMapping {
                            raw_key: raw_key.clone(),
                            mapped_key: mapped.clone(),
                            mapping_source: resolution.source,
                        });
                        deferred.push((mapped, value));
                    } else {
                        result.entities.insert(mapped, value.clone());
                    }
                }
                None => {
                    if self.config.log_unmapped {
                        debug!(raw_key = %raw_key, "Unmapped entity key passed through");
                    }
                    result.unmapped_keys.push(raw_key.clone());
                    deferred.push((raw_key.clone(), value));
                }
            }
        }

        for (key, value) in deferred {
            result.entities.entry(key).or_insert_with(|| value.clone());
        }

        result
    }

    /// Normalize both the intent and the entities of an analyzer result.
    pub fn normalize(&self, analysis: &AnalysisResult) -> Result<NormalizationResult, NormalizeError> {
        Ok(NormalizationResult {
            intent: self.normalize_intent(analysis.intent())?,
            entities: self.normalize_entities(analysis.entities()),
        })
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Empty the lookup and fuzzy tiers.
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Normalizer cache cleared");
    }

    pub fn initialize_cache_stats(&self) {
        self.cache.reset_stats();
    }

    fn resolve(&self, kind: MappingKind, raw: &str) -> Resolution {
        if let Some(mapped) = self.cache.precomputed(kind, raw) {
            return Resolution {
                mapped: Some(mapped.to_string()),
                source: MappingSource::PrecomputedDirect,
                score: 1.0,
            };
        }

        if let Some(cached) = self.cache.get_lookup(kind, raw) {
            let source = if cached.mapped.is_some() {
                MappingSource::LookupCache
            } else {
                MappingSource::None
            };
            return Resolution {
                mapped: cached.mapped,
                source,
                score: cached.score,
            };
        }

        let folded = fold_key(raw);
        if let Some(cached) = self.cache.get_fuzzy(kind, &folded) {
            self.cache.put_lookup(kind, raw, cached.clone());
            let source = if cached.mapped.is_some() {
                MappingSource::FuzzyCache
            } else {
                MappingSource::None
            };
            return Resolution {
                mapped: cached.mapped,
                source,
                score: cached.score,
            };
        }

        self.cache.record_miss();
        let matcher = match kind {
            MappingKind::Intent => &self.intent_matcher,
            MappingKind::Entity => &self.entity_matcher,
        };
        let found = matcher.find(&folded);

        let (mapped, source, score) = match found {
            Some(m) => {
                debug!(
                    raw = %raw,
                    canonical = %m.canonical,
                    score = m.score,
                    method = ?m.method,
                    "Fuzzy mapping resolved"
                );
                (Some(m.canonical), MappingSource::FuzzyMatch, m.score)
            }
            None => (None, MappingSource::None, 0.0),
        };

        let memo = CachedMapping {
            mapped: mapped.clone(),
            source,
            score,
        };
        self.cache.put_fuzzy(kind, &folded, memo.clone());
        self.cache.put_lookup(kind, raw, memo);

        Resolution {
            mapped,
            source,
            score,
        }
    }
}
