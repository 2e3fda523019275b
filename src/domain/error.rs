use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {message}")]
    InvalidVector { message: String },

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Provider timeout: {provider} did not answer within {after_ms}ms")]
    Timeout { provider: String, after_ms: u64 },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Corrupt entry '{key}': {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    pub fn invalid_vector(message: impl Into<String>) -> Self {
        Self::InvalidVector {
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn timeout(provider: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            provider: provider.into(),
            after_ms,
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    pub fn corrupt_entry(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptEntry {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error came from a collaborator call rather than cache state
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Timeout { .. })
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_error() {
        let error = DomainError::dimension_mismatch(3, 4);
        assert_eq!(error.to_string(), "Dimension mismatch: expected 3, got 4");
    }

    #[test]
    fn test_timeout_error() {
        let error = DomainError::timeout("openai", 250);
        assert_eq!(
            error.to_string(),
            "Provider timeout: openai did not answer within 250ms"
        );
        assert!(error.is_provider_failure());
    }

    #[test]
    fn test_corrupt_entry_error() {
        let error = DomainError::corrupt_entry("emb:query:abc", "slot 9 out of range");
        assert_eq!(
            error.to_string(),
            "Corrupt entry 'emb:query:abc': slot 9 out of range"
        );
        assert!(!error.is_provider_failure());
    }
}
