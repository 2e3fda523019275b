//! PMP Semantic Cache
//!
//! Similarity-indexed cache in front of embedding and completion providers:
//! - Deterministic request fingerprints with per-partition similarity matching
//! - Flat vector index that switches to clustered search as it grows
//! - Per-kind similarity thresholds and TTLs
//! - Batch-aware embedding reuse
//! - Crash-safe snapshot persistence

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::DomainError;
pub use infrastructure::services::{CachedResult, SearchResult, SemanticCacheEngine};
