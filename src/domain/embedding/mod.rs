//! Embedding provider domain models and traits

mod provider;
mod request;
mod response;
mod vector;

pub use provider::EmbeddingProvider;
pub use request::{EmbeddingInput, EmbeddingRequest};
pub use response::{Embedding, EmbeddingResponse, EmbeddingUsage};
pub use vector::{cosine_similarity, normalized, similarity_from_squared_l2, squared_l2};

#[cfg(test)]
pub use provider::mock::MockEmbeddingProvider;
