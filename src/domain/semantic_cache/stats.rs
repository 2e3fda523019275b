//! Cache statistics snapshot types

use serde::{Deserialize, Serialize};

/// Statistics bucket a request falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestClass {
    Single,
    Batch,
    Completion,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStats {
    pub hits: u64,
    pub misses: u64,
}

impl ClassStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Point-in-time view of the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Live entries in the entry store
    pub total_entries: usize,
    /// Vectors stored in the index, dead slots included
    pub index_size: usize,
    /// Index slots no longer owned by any entry
    pub dead_slots: usize,
    pub dimension: Option<usize>,
    /// Whether the index answers through clustered search
    pub clustered: bool,

    pub single: ClassStats,
    pub batch: ClassStats,
    pub completion: ClassStats,

    pub exact_hits: u64,
    pub semantic_hits: u64,
    /// Batch hits rebuilt from per-item entries
    pub assembled_hits: u64,
    /// Lookups that failed because the provider could not vectorize the input
    pub lookup_errors: u64,
    /// Similarity lookups whose best candidate had expired
    pub stale_candidates: u64,
    pub avg_hit_similarity: f32,

    pub estimated_tokens_saved: u64,
    pub estimated_cost_saved: f64,

    pub expired_removed: u64,
    pub skipped_on_load: usize,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.single.hits + self.batch.hits + self.completion.hits
    }

    pub fn misses(&self) -> u64 {
        self.single.misses + self.batch.misses + self.completion.misses
    }

    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses()
    }

    pub fn hit_rate(&self) -> f32 {
        let total = self.total_requests();

        if total == 0 {
            return 0.0;
        }

        self.hits() as f32 / total as f32
    }
}
