//! Provider for processes that only maintain persisted snapshots

use async_trait::async_trait;

use crate::domain::embedding::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;

/// Refuses every call; lookups that need a vector fail with a provider error
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineEmbeddingProvider;

impl OfflineEmbeddingProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmbeddingProvider for OfflineEmbeddingProvider {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
        Err(DomainError::provider(
            self.provider_name(),
            format!(
                "no embedding backend configured ({} input(s) refused)",
                request.input().len()
            ),
        ))
    }

    fn provider_name(&self) -> &'static str {
        "offline"
    }
}
