//! Semantic cache configuration
//!
//! Similarity thresholds and TTLs have no built-in defaults: deployments
//! disagree on them by an order of magnitude, so every caller states them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::EntryKind;

/// Minimum similarity for a hit, per entry kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityThresholds {
    pub query: f32,
    pub document: f32,
    pub passage: f32,
    pub completion: f32,
    pub other: f32,
}

impl SimilarityThresholds {
    /// Same threshold for every kind
    pub fn uniform(threshold: f32) -> Self {
        let t = threshold.clamp(0.0, 1.0);
        Self {
            query: t,
            document: t,
            passage: t,
            completion: t,
            other: t,
        }
    }

    /// Override the threshold of one kind
    pub fn with_kind(mut self, kind: EntryKind, threshold: f32) -> Self {
        let t = threshold.clamp(0.0, 1.0);
        match kind {
            EntryKind::Query => self.query = t,
            EntryKind::Document => self.document = t,
            EntryKind::Passage => self.passage = t,
            EntryKind::Completion => self.completion = t,
            EntryKind::Other => self.other = t,
        }
        self
    }

    pub fn for_kind(&self, kind: EntryKind) -> f32 {
        match kind {
            EntryKind::Query => self.query,
            EntryKind::Document => self.document,
            EntryKind::Passage => self.passage,
            EntryKind::Completion => self.completion,
            EntryKind::Other => self.other,
        }
    }
}

/// Time-to-live in seconds per entry kind; `None` means never expires
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPolicy {
    #[serde(default)]
    pub query: Option<u64>,
    #[serde(default)]
    pub document: Option<u64>,
    #[serde(default)]
    pub passage: Option<u64>,
    #[serde(default)]
    pub completion: Option<u64>,
    #[serde(default)]
    pub other: Option<u64>,
}

impl TtlPolicy {
    pub fn uniform(ttl: Option<Duration>) -> Self {
        let secs = ttl.map(|t| t.as_secs());
        Self {
            query: secs,
            document: secs,
            passage: secs,
            completion: secs,
            other: secs,
        }
    }

    pub fn with_kind(mut self, kind: EntryKind, ttl: Option<Duration>) -> Self {
        let secs = ttl.map(|t| t.as_secs());
        match kind {
            EntryKind::Query => self.query = secs,
            EntryKind::Document => self.document = secs,
            EntryKind::Passage => self.passage = secs,
            EntryKind::Completion => self.completion = secs,
            EntryKind::Other => self.other = secs,
        }
        self
    }

    pub fn ttl_for(&self, kind: EntryKind) -> Option<Duration> {
        let secs = match kind {
            EntryKind::Query => self.query,
            EntryKind::Document => self.document,
            EntryKind::Passage => self.passage,
            EntryKind::Completion => self.completion,
            EntryKind::Other => self.other,
        };
        secs.map(Duration::from_secs)
    }
}

/// Vector index tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Vector count at which the flat index switches to clustered search
    #[serde(default = "default_clustered_threshold")]
    pub clustered_threshold: usize,

    /// Number of clusters; `None` picks sqrt(count)
    #[serde(default)]
    pub clusters: Option<usize>,

    /// Clusters scanned per query
    #[serde(default = "default_probes")]
    pub probes: usize,

    /// Lloyd iterations when (re)training clusters
    #[serde(default = "default_training_iterations")]
    pub training_iterations: usize,
}

fn default_clustered_threshold() -> usize {
    10_000
}

fn default_probes() -> usize {
    8
}

fn default_training_iterations() -> usize {
    10
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            clustered_threshold: default_clustered_threshold(),
            clusters: None,
            probes: default_probes(),
            training_iterations: default_training_iterations(),
        }
    }
}

impl IndexConfig {
    pub fn with_clustered_threshold(mut self, threshold: usize) -> Self {
        self.clustered_threshold = threshold;
        self
    }

    pub fn with_clusters(mut self, clusters: usize) -> Self {
        self.clusters = Some(clusters.max(1));
        self
    }

    pub fn with_probes(mut self, probes: usize) -> Self {
        self.probes = probes.max(1);
        self
    }
}

/// Prices used to estimate what cache hits saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    #[serde(default = "default_embedding_price")]
    pub embedding_per_1k_tokens: f64,
    #[serde(default = "default_completion_price")]
    pub completion_per_1k_tokens: f64,
}

fn default_embedding_price() -> f64 {
    0.00013
}

fn default_completion_price() -> f64 {
    0.01
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            embedding_per_1k_tokens: default_embedding_price(),
            completion_per_1k_tokens: default_completion_price(),
        }
    }
}

/// Configuration for the semantic cache engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCacheConfig {
    /// Whether lookups fall back to embedding similarity after an exact miss
    #[serde(default = "default_true")]
    pub similarity_enabled: bool,

    pub thresholds: SimilarityThresholds,

    pub ttl: TtlPolicy,

    /// Nearest neighbours fetched per similarity lookup
    #[serde(default = "default_search_candidates")]
    pub search_candidates: usize,

    /// Default bound on provider calls made during lookups
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,

    /// Embedding model used to vectorize completion prompts
    #[serde(default)]
    pub embedding_model: Option<String>,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub cost: CostModel,
}

fn default_true() -> bool {
    true
}

fn default_search_candidates() -> usize {
    8
}

fn default_provider_timeout_ms() -> u64 {
    10_000
}

impl SemanticCacheConfig {
    pub fn new(thresholds: SimilarityThresholds, ttl: TtlPolicy) -> Self {
        Self {
            similarity_enabled: default_true(),
            thresholds,
            ttl,
            search_candidates: default_search_candidates(),
            provider_timeout_ms: default_provider_timeout_ms(),
            embedding_model: None,
            index: IndexConfig::default(),
            cost: CostModel::default(),
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn with_similarity_enabled(mut self, enabled: bool) -> Self {
        self.similarity_enabled = enabled;
        self
    }

    pub fn with_thresholds(mut self, thresholds: SimilarityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_search_candidates(mut self, candidates: usize) -> Self {
        self.search_candidates = candidates.max(1);
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = index;
        self
    }

    pub fn with_cost(mut self, cost: CostModel) -> Self {
        self.cost = cost;
        self
    }
}
