//! Infrastructure services

mod semantic_cache_engine;

pub use semantic_cache_engine::{CachedResult, SearchResult, SemanticCacheEngine};
