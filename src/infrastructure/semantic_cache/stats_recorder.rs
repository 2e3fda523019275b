//! Cumulative counters behind `CacheStats`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::semantic_cache::{CacheStats, ClassStats, MatchType, RequestClass};

#[derive(Debug, Default)]
struct ClassCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ClassCounters {
    fn snapshot(&self) -> ClassStats {
        ClassStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct Savings {
    similarity_sum: f64,
    similarity_count: u64,
    cost: f64,
}

/// Process-lifetime statistics; never reset
#[derive(Debug, Default)]
pub struct StatsRecorder {
    single: ClassCounters,
    batch: ClassCounters,
    completion: ClassCounters,
    exact_hits: AtomicU64,
    semantic_hits: AtomicU64,
    assembled_hits: AtomicU64,
    lookup_errors: AtomicU64,
    stale_candidates: AtomicU64,
    tokens_saved: AtomicU64,
    expired_removed: AtomicU64,
    savings: Mutex<Savings>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn class(&self, class: RequestClass) -> &ClassCounters {
        match class {
            RequestClass::Single => &self.single,
            RequestClass::Batch => &self.batch,
            RequestClass::Completion => &self.completion,
        }
    }

    pub fn record_hit(
        &self,
        class: RequestClass,
        match_type: MatchType,
        similarity: f32,
        tokens: u64,
        cost: f64,
    ) {
        self.class(class).hits.fetch_add(1, Ordering::Relaxed);
        self.tokens_saved.fetch_add(tokens, Ordering::Relaxed);

        let mut savings = self.savings.lock().unwrap_or_else(PoisonError::into_inner);
        savings.cost += cost;

        match match_type {
            MatchType::Exact => {
                self.exact_hits.fetch_add(1, Ordering::Relaxed);
            }
            MatchType::Semantic => {
                self.semantic_hits.fetch_add(1, Ordering::Relaxed);
                savings.similarity_sum += similarity as f64;
                savings.similarity_count += 1;
            }
            MatchType::Assembled => {
                self.assembled_hits.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_miss(&self, class: RequestClass) {
        self.class(class).misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A lookup that could not complete; also counts as a miss
    pub fn record_lookup_error(&self, class: RequestClass) {
        self.lookup_errors.fetch_add(1, Ordering::Relaxed);
        self.record_miss(class);
    }

    pub fn record_stale_candidate(&self) {
        self.stale_candidates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, removed: usize) {
        self.expired_removed
            .fetch_add(removed as u64, Ordering::Relaxed);
    }

    /// Counter fields of `CacheStats`; state-derived fields stay at default
    pub fn snapshot(&self) -> CacheStats {
        let savings = self.savings.lock().unwrap_or_else(PoisonError::into_inner);

        let avg_hit_similarity = if savings.similarity_count == 0 {
            0.0
        } else {
            (savings.similarity_sum / savings.similarity_count as f64) as f32
        };

        CacheStats {
            single: self.single.snapshot(),
            batch: self.batch.snapshot(),
            completion: self.completion.snapshot(),
            exact_hits: self.exact_hits.load(Ordering::Relaxed),
            semantic_hits: self.semantic_hits.load(Ordering::Relaxed),
            assembled_hits: self.assembled_hits.load(Ordering::Relaxed),
            lookup_errors: self.lookup_errors.load(Ordering::Relaxed),
            stale_candidates: self.stale_candidates.load(Ordering::Relaxed),
            avg_hit_similarity,
            estimated_tokens_saved: self.tokens_saved.load(Ordering::Relaxed),
            estimated_cost_saved: savings.cost,
            expired_removed: self.expired_removed.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

/// Rough token count: one token per four characters, rounded up
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_counters_by_class() {
        let recorder = StatsRecorder::new();

        recorder.record_hit(RequestClass::Single, MatchType::Exact, 1.0, 10, 0.001);
        recorder.record_hit(RequestClass::Completion, MatchType::Semantic, 0.8, 40, 0.4);
        recorder.record_hit(RequestClass::Batch, MatchType::Assembled, 0.9, 0, 0.0);
        recorder.record_miss(RequestClass::Batch);
        recorder.record_lookup_error(RequestClass::Single);
        recorder.record_stale_candidate();
        recorder.record_expired(3);

        let stats = recorder.snapshot();

        assert_eq!(stats.single, ClassStats { hits: 1, misses: 1 });
        assert_eq!(stats.batch, ClassStats { hits: 1, misses: 1 });
        assert_eq!(stats.assembled_hits, 1);
        assert_eq!(stats.completion, ClassStats { hits: 1, misses: 0 });
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.semantic_hits, 1);
        assert_eq!(stats.lookup_errors, 1);
        assert_eq!(stats.stale_candidates, 1);
        assert_eq!(stats.expired_removed, 3);
        assert_eq!(stats.estimated_tokens_saved, 50);
        assert!((stats.avg_hit_similarity - 0.8).abs() < 1e-6);
        assert!((stats.estimated_cost_saved - 0.401).abs() < 1e-9);
    }
}
