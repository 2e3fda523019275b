//! Embedding request types

use serde::{Deserialize, Serialize};

/// Text to be embedded: one input or an ordered batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    /// Single text input
    Single(String),
    /// Ordered batch of text inputs
    Batch(Vec<String>),
}

impl EmbeddingInput {
    /// All inputs in order
    pub fn items(&self) -> Vec<&str> {
        match self {
            EmbeddingInput::Single(s) => vec![s.as_str()],
            EmbeddingInput::Batch(v) => v.iter().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EmbeddingInput::Single(_) => 1,
            EmbeddingInput::Batch(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            EmbeddingInput::Single(s) => s.is_empty(),
            EmbeddingInput::Batch(v) => v.is_empty(),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, EmbeddingInput::Batch(_))
    }

    /// The single text, if this is not a batch
    pub fn as_single(&self) -> Option<&str> {
        match self {
            EmbeddingInput::Single(s) => Some(s),
            EmbeddingInput::Batch(_) => None,
        }
    }
}

impl From<&str> for EmbeddingInput {
    fn from(text: &str) -> Self {
        EmbeddingInput::Single(text.to_string())
    }
}

impl From<String> for EmbeddingInput {
    fn from(text: String) -> Self {
        EmbeddingInput::Single(text)
    }
}

impl From<Vec<String>> for EmbeddingInput {
    fn from(texts: Vec<String>) -> Self {
        EmbeddingInput::Batch(texts)
    }
}

/// Request sent to an embedding provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Model (deployment) to use, `None` lets the provider pick its default
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    input: EmbeddingInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

impl EmbeddingRequest {
    pub fn new(input: EmbeddingInput) -> Self {
        Self {
            model: None,
            input,
            encoding_format: None,
            dimensions: None,
            user: None,
        }
    }

    /// Create a request for a single text
    pub fn single(text: impl Into<String>) -> Self {
        Self::new(EmbeddingInput::Single(text.into()))
    }

    /// Create a request for multiple texts
    pub fn batch(texts: Vec<String>) -> Self {
        Self::new(EmbeddingInput::Batch(texts))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_encoding_format(mut self, format: impl Into<String>) -> Self {
        self.encoding_format = Some(format.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn input(&self) -> &EmbeddingInput {
        &self.input
    }

    pub fn inputs(&self) -> Vec<&str> {
        self.input.items()
    }

    pub fn encoding_format(&self) -> Option<&str> {
        self.encoding_format.as_deref()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}
