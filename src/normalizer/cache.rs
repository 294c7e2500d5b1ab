//! Three-tier mapping cache.
//!
//! - precomputed: built once from the static tables, read-only, never evicted
//! - lookup: memoized resolutions keyed by the raw value
//! - fuzzy: memoized approximate matches keyed by the folded value
//!
//! The lookup and fuzzy tiers live in one LRU so they share a single size
//! ceiling and evict the globally least-recently-used entry first.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::MappingSource;

/// Which vocabulary a mapping belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    Intent,
    Entity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheTier {
    Lookup,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    tier: CacheTier,
    kind: MappingKind,
    key: String,
}

/// A memoized resolution. `mapped = None` caches a miss.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMapping {
    pub mapped: Option<String>,
    /// Source of the original resolution.
    pub source: MappingSource,
    pub score: f64,
}

struct CacheInner {
    entries: LruCache<CacheKey, CachedMapping>,
    lookup_size: usize,
    fuzzy_size: usize,
}

#[derive(Default)]
struct CacheCounters {
    precomputed_hits: AtomicU64,
    lookup_hits: AtomicU64,
    fuzzy_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of cache occupancy and effectiveness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub precomputed_size: usize,
    pub lookup_cache_size: usize,
    pub fuzzy_cache_size: usize,
    pub max_cache_size: usize,
    pub precomputed_hits: u64,
    pub lookup_hits: u64,
    pub fuzzy_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Hits over all resolutions, 0 when nothing was resolved yet.
    pub hit_ratio: f64,
    /// Bounded-tier occupancy over `max_cache_size`.
    pub utilization: f64,
    pub suggestions: Vec<String>,
}

/// Cache owned by one normalizer instance.
pub struct NormalizerCache {
    precomputed: HashMap<(MappingKind, String), String>,
    inner: Mutex<CacheInner>,
    counters: CacheCounters,
    max_size: usize,
}

impl NormalizerCache {
    /// Create a cache with the given precomputed table and bounded-tier ceiling.
    pub fn new(precomputed: HashMap<(MappingKind, String), String>, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            precomputed,
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                lookup_size: 0,
                fuzzy_size: 0,
            }),
            counters: CacheCounters::default(),
            max_size,
        }
    }

    /// O(1) read of the precomputed tier.
    pub fn precomputed(&self, kind: MappingKind, raw: &str) -> Option<&str> {
        let hit = self
            .precomputed
            .get(&(kind, raw.to_string()))
            .map(String::as_str);
        if hit.is_some() {
            self.counters.precomputed_hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Read the lookup tier, refreshing recency on hit.
    pub fn get_lookup(&self, kind: MappingKind, raw: &str) -> Option<CachedMapping> {
        self.get(CacheTier::Lookup, kind, raw)
    }

    /// Read the fuzzy tier, refreshing recency on hit.
    pub fn get_fuzzy(&self, kind: MappingKind, folded: &str) -> Option<CachedMapping> {
        self.get(CacheTier::Fuzzy, kind, folded)
    }

    pub fn put_lookup(&self, kind: MappingKind, raw: &str, mapping: CachedMapping) {
        self.put(CacheTier::Lookup, kind, raw, mapping);
    }

    pub fn put_fuzzy(&self, kind: MappingKind, folded: &str, mapping: CachedMapping) {
        self.put(CacheTier::Fuzzy, kind, folded, mapping);
    }

    /// Count a resolution that no tier could answer.
    pub fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self, tier: CacheTier, kind: MappingKind, key: &str) -> Option<CachedMapping> {
        let cache_key = CacheKey {
            tier,
            kind,
            key: key.to_string(),
        };
        let hit = self.inner.lock().entries.get(&cache_key).cloned();
        if hit.is_some() {
            let counter = match tier {
                CacheTier::Lookup => &self.counters.lookup_hits,
                CacheTier::Fuzzy => &self.counters.fuzzy_hits,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    fn put(&self, tier: CacheTier, kind: MappingKind, key: &str, mapping: CachedMapping) {
        let cache_key = CacheKey {
            tier,
            kind,
            key: key.to_string(),
        };
        let mut inner = self.inner.lock();

        match inner.entries.push(cache_key.clone(), mapping) {
            // Same key replaced: sizes unchanged
            Some((old_key, _)) if old_key == cache_key => {}
            Some((evicted, _)) => {
                inner.adjust(tier, 1);
                inner.adjust(evicted.tier, -1);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(
                    evicted_tier = ?evicted.tier,
                    evicted_key = %evicted.key,
                    "Evicted least-recently-used mapping"
                );
            }
            None => inner.adjust(tier, 1),
        }
    }

    /// Drop both bounded tiers. The precomputed table is untouched.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.lookup_size = 0;
        inner.fuzzy_size = 0;
    }

    /// Reset hit, miss and eviction counters.
    pub fn reset_stats(&self) {
        for counter in [
            &self.counters.precomputed_hits,
            &self.counters.lookup_hits,
            &self.counters.fuzzy_hits,
            &self.counters.misses,
            &self.counters.evictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Current statistics with tuning suggestions.
    pub fn stats(&self) -> CacheStats {
        let (lookup_cache_size, fuzzy_cache_size) = {
            let inner = self.inner.lock();
            (inner.lookup_size, inner.fuzzy_size)
        };

        let precomputed_hits = self.counters.precomputed_hits.load(Ordering::Relaxed);
        let lookup_hits = self.counters.lookup_hits.load(Ordering::Relaxed);
        let fuzzy_hits = self.counters.fuzzy_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let evictions = self.counters.evictions.load(Ordering::Relaxed);

        let hits = precomputed_hits + lookup_hits + fuzzy_hits;
        let total = hits + misses;
        let hit_ratio = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        let utilization = (lookup_cache_size + fuzzy_cache_size) as f64 / self.max_size as f64;

        CacheStats {
            precomputed_size: self.precomputed.len(),
            lookup_cache_size,
            fuzzy_cache_size,
            max_cache_size: self.max_size,
            precomputed_hits,
            lookup_hits,
            fuzzy_hits,
            misses,
            evictions,
            hit_ratio,
            utilization,
            suggestions: suggestions(total, hit_ratio, evictions, utilization),
        }
    }
}

impl CacheInner {
    fn adjust(&mut self, tier: CacheTier, delta: isize) {
        let size = match tier {
            CacheTier::Lookup => &mut self.lookup_size,
            CacheTier::Fuzzy => &mut self.fuzzy_size,
        };
        *size = size.saturating_add_signed(delta);
    }
}

/// Minimum resolutions before ratios are considered meaningful.
const MIN_SAMPLE: u64 = 20;

fn suggestions(total: u64, hit_ratio: f64, evictions: u64, utilization: f64) -> Vec<String> {
    let mut out = Vec::new();
    if total < MIN_SAMPLE {
        out.push(format!(
            "Only {} resolutions recorded; statistics are not yet representative",
            total
        ));
        return out;
    }

    if hit_ratio < 0.5 {
        out.push(format!(
            "Hit ratio {:.0}% is low: add frequent raw values to the alias tables so they resolve from the precomputed tier",
            hit_ratio * 100.0
        ));
    } else if hit_ratio >= 0.9 {
        out.push(format!("Hit ratio {:.0}% is healthy", hit_ratio * 100.0));
    }

    let eviction_rate = evictions as f64 / total as f64;
    if eviction_rate > 0.1 {
        out.push(format!(
            "Evictions on {:.0}% of resolutions: raise MAX_CACHE_SIZE",
            eviction_rate * 100.0
        ));
    } else if utilization < 0.1 && total >= 100 {
        out.push("Bounded tiers are under 10% full: MAX_CACHE_SIZE can be lowered".to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(mapped: &str) -> CachedMapping {
        CachedMapping {
            mapped: Some(mapped.to_string()),
            source: MappingSource::FuzzyMatch,
            score: 0.9,
        }
    }

    fn cache(max: usize) -> NormalizerCache {
        let mut precomputed = HashMap::new();
        precomputed.insert(
            (MappingKind::Intent, "record_course".to_string()),
            "record_course".to_string(),
        );
        NormalizerCache::new(precomputed, max)
    }

    #[test]
    fn test_combined_bound_evicts_lru_across_tiers() {
        let cache = cache(3);
        cache.put_fuzzy(MappingKind::Intent, "a", mapping("x"));
        cache.put_lookup(MappingKind::Intent, "b", mapping("x"));
        cache.put_lookup(MappingKind::Intent, "c", mapping("x"));
        // Touch "a" so "b" becomes least recent
        assert!(cache.get_fuzzy(MappingKind::Intent, "a").is_some());
        cache.put_lookup(MappingKind::Intent, "d", mapping("x"));

        let stats = cache.stats();
        assert_eq!(stats.lookup_cache_size + stats.fuzzy_cache_size, 3);
        assert_eq!(stats.fuzzy_cache_size, 1);
        assert_eq!(stats.evictions, 1);
        assert!(cache.get_lookup(MappingKind::Intent, "b").is_none());
        assert!(cache.get_lookup(MappingKind::Intent, "d").is_some());
    }

    #[test]
    fn test_replacing_key_does_not_grow() {
        let cache = cache(3);
        cache.put_lookup(MappingKind::Entity, "k", mapping("x"));
        cache.put_lookup(MappingKind::Entity, "k", mapping("y"));
        let stats = cache.stats();
        assert_eq!(stats.lookup_cache_size, 1);
        assert_eq!(stats.evictions, 0);
        assert_eq!(
            cache.get_lookup(MappingKind::Entity, "k").unwrap().mapped.as_deref(),
            Some("y")
        );
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let cache = cache(10);
        cache.put_lookup(MappingKind::Entity, "course", mapping("course_name"));
        assert!(cache.get_lookup(MappingKind::Intent, "course").is_none());
    }

    #[test]
    fn test_clear_keeps_precomputed() {
        let cache = cache(10);
        cache.put_lookup(MappingKind::Intent, "b", mapping("x"));
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.lookup_cache_size, 0);
        assert_eq!(stats.precomputed_size, 1);
        assert_eq!(
            cache.precomputed(MappingKind::Intent, "record_course"),
            Some("record_course")
        );
    }

    #[test]
    fn test_stats_and_reset() {
        let cache = cache(10);
        cache.precomputed(MappingKind::Intent, "record_course");
        cache.record_miss();
        let stats = cache.stats();
        assert_eq!(stats.precomputed_hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio - 0.5).abs() < f64::EPSILON);
        assert!(!stats.suggestions.is_empty());

        cache.reset_stats();
        let stats = cache.stats();
        assert_eq!(stats.precomputed_hits + stats.misses, 0);
        assert_eq!(stats.hit_ratio, 0.0);
    }

    #[test]
    fn test_low_hit_ratio_suggestion() {
        let out = suggestions(100, 0.2, 50, 1.0);
        assert!(out.iter().any(|s| s.contains("alias tables")));
        assert!(out.iter().any(|s| s.contains("raise MAX_CACHE_SIZE")));
    }
}
