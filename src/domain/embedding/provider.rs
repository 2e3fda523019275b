//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use super::{EmbeddingRequest, EmbeddingResponse};
use crate::domain::DomainError;

/// Turns text into vectors (OpenAI, Azure, local models, ...)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Generate embeddings for the given input, one per item, in order
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
pub mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::domain::embedding::{Embedding, EmbeddingUsage};

    /// Bag-of-words embedder: texts sharing words get proportionally similar
    /// vectors, identical texts get identical vectors.
    #[derive(Debug)]
    pub struct MockEmbeddingProvider {
        name: &'static str,
        dimensions: usize,
        error: Option<String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        embedded_texts: AtomicUsize,
    }

    impl MockEmbeddingProvider {
        pub fn new(name: &'static str, dimensions: usize) -> Self {
            Self {
                name,
                dimensions,
                error: None,
                delay: None,
                calls: AtomicUsize::new(0),
                embedded_texts: AtomicUsize::new(0),
            }
        }

        pub fn with_error(mut self, error: impl Into<String>) -> Self {
            self.error = Some(error.into());
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Number of `embed` calls received
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Number of individual texts embedded across all calls
        pub fn embedded_texts(&self) -> usize {
            self.embedded_texts.load(Ordering::SeqCst)
        }

        pub fn vector_for(&self, text: &str) -> Vec<f32> {
            let mut vector = vec![0.0; self.dimensions];

            for word in text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
            {
                let word = word.to_lowercase();
                let hash = word.bytes().fold(0xcbf29ce484222325u64, |acc, b| {
                    (acc ^ b as u64).wrapping_mul(0x100000001b3)
                });
                vector[(hash % self.dimensions as u64) as usize] += 1.0;
            }

            if vector.iter().all(|x| *x == 0.0) {
                vector[0] = 1.0;
            }

            vector
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(ref error) = self.error {
                return Err(DomainError::provider(self.name, error));
            }

            let inputs = request.inputs();
            self.embedded_texts.fetch_add(inputs.len(), Ordering::SeqCst);

            let embeddings: Vec<Embedding> = inputs
                .iter()
                .enumerate()
                .map(|(idx, text)| Embedding::new(idx, self.vector_for(text)))
                .collect();

            let total_tokens = inputs.iter().map(|t| t.len() / 4).sum::<usize>() as u32;

            Ok(EmbeddingResponse::new(
                request.model().unwrap_or("mock-embedding"),
                embeddings,
                EmbeddingUsage::new(total_tokens, total_tokens),
            ))
        }

        fn provider_name(&self) -> &'static str {
            self.name
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::domain::embedding::cosine_similarity;

        #[tokio::test]
        async fn test_mock_provider_batch_input() {
            let provider = MockEmbeddingProvider::new("test", 64);
            let request = EmbeddingRequest::batch(vec!["Hello".into(), "World".into()]);

            let response = provider.embed(request).await.unwrap();

            assert_eq!(response.embeddings().len(), 2);
            assert_eq!(response.embeddings()[1].vector().len(), 64);
            assert_eq!(provider.calls(), 1);
            assert_eq!(provider.embedded_texts(), 2);
        }

        #[tokio::test]
        async fn test_mock_provider_error() {
            let provider = MockEmbeddingProvider::new("test", 8).with_error("rate limited");

            let result = provider.embed(EmbeddingRequest::single("Hello")).await;

            assert!(matches!(result, Err(DomainError::Provider { .. })));
        }

        #[test]
        fn test_shared_words_are_partially_similar() {
            let provider = MockEmbeddingProvider::new("test", 256);
            let a = provider.vector_for("What is machine learning?");
            let b = provider.vector_for("Explain machine learning");
            let c = provider.vector_for("What is machine learning?");

            let partial = cosine_similarity(&a, &b);
            assert!(partial > 0.3 && partial < 0.95, "similarity was {partial}");
            assert!((cosine_similarity(&a, &c) - 1.0).abs() < 1e-6);
        }
    }
}
