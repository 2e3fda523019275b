//! Cache lookup requests

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EntryKind, RequestClass};
use crate::domain::embedding::{EmbeddingInput, EmbeddingRequest};
use crate::domain::llm::LlmRequest;

/// Which upstream result a request caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Cached payload is a vector (or batch of vectors)
    Embedding,
    /// Cached payload is completion text, matched by prompt embedding
    Completion,
}

impl CacheMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Embedding => "embedding",
            CacheMode::Completion => "completion",
        }
    }
}

/// A request as seen by the cache: input text(s) plus every attribute that
/// changes what the provider would answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRequest {
    mode: CacheMode,
    input: EmbeddingInput,
    kind: EntryKind,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    dimensions: Option<usize>,
    #[serde(default)]
    encoding_format: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl CacheRequest {
    fn new(mode: CacheMode, input: EmbeddingInput, kind: EntryKind) -> Self {
        Self {
            mode,
            input,
            kind,
            model: None,
            dimensions: None,
            encoding_format: None,
            user: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Single-text embedding request, kind `Query` until told otherwise
    pub fn embedding(text: impl Into<String>) -> Self {
        Self::new(
            CacheMode::Embedding,
            EmbeddingInput::Single(text.into()),
            EntryKind::Query,
        )
    }

    /// Ordered batch embedding request
    pub fn embedding_batch(texts: Vec<String>) -> Self {
        Self::new(
            CacheMode::Embedding,
            EmbeddingInput::Batch(texts),
            EntryKind::Query,
        )
    }

    /// Completion request keyed by its prompt text
    pub fn completion(prompt: impl Into<String>) -> Self {
        Self::new(
            CacheMode::Completion,
            EmbeddingInput::Single(prompt.into()),
            EntryKind::Completion,
        )
    }

    /// Completion request for a chat
    ///
    /// User turns become the prompt. System and assistant turns plus the
    /// sampling parameters become metadata, so they split the partition.
    pub fn from_llm_request(model: &str, request: &LlmRequest) -> Self {
        let mut cache_request = Self::completion(request.user_text()).with_model(model);

        if let Some(context) = request.context_digest() {
            cache_request = cache_request.with_metadata("context", context);
        }

        if let Some(temperature) = request.temperature {
            cache_request = cache_request.with_metadata("temperature", format!("{:.3}", temperature));
        }

        if let Some(max_tokens) = request.max_tokens {
            cache_request = cache_request.with_metadata("max_tokens", max_tokens.to_string());
        }

        cache_request
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn with_encoding_format(mut self, format: impl Into<String>) -> Self {
        self.encoding_format = Some(format.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn input(&self) -> &EmbeddingInput {
        &self.input
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn encoding_format(&self) -> Option<&str> {
        self.encoding_format.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn is_batch(&self) -> bool {
        self.input.is_batch()
    }

    /// Statistics bucket for this request
    pub fn class(&self) -> RequestClass {
        match (self.mode, self.input.is_batch()) {
            (CacheMode::Completion, _) => RequestClass::Completion,
            (CacheMode::Embedding, true) => RequestClass::Batch,
            (CacheMode::Embedding, false) => RequestClass::Single,
        }
    }

    /// Provider request reproducing this request's options for `texts`
    pub fn embedding_request(&self, texts: Vec<String>) -> EmbeddingRequest {
        let mut request = match texts.len() {
            1 if !self.input.is_batch() => {
                EmbeddingRequest::single(texts.into_iter().next().unwrap_or_default())
            }
            _ => EmbeddingRequest::batch(texts),
        };

        if let Some(model) = &self.model {
            request = request.with_model(model);
        }
        if let Some(dimensions) = self.dimensions {
            request = request.with_dimensions(dimensions);
        }
        if let Some(format) = &self.encoding_format {
            request = request.with_encoding_format(format);
        }
        if let Some(user) = &self.user {
            request = request.with_user(user);
        }

        request
    }
}
