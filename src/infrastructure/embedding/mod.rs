//! Embedding provider implementations

mod offline;

pub use offline::OfflineEmbeddingProvider;
