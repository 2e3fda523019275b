//! Semantic cache domain models and traits
//!
//! Matches semantically similar requests through a vector index rather than
//! requiring exact key matches.

mod config;
mod decision;
mod entry;
mod index;
mod lookup;
mod request;
mod stats;

pub use config::{CostModel, IndexConfig, SemanticCacheConfig, SimilarityThresholds, TtlPolicy};
pub use decision::{Decision, DecisionOutcome, SimilarityDecider, SlotOwner, SlotResolver};
pub use entry::{CacheEntry, CachePayload, EntryKind};
pub use index::{SearchHit, VectorIndex};
pub use lookup::{CacheHit, CacheLookup, CacheMiss, MatchType, MissReason};
pub use request::{CacheMode, CacheRequest};
pub use stats::{CacheStats, ClassStats, RequestClass};
