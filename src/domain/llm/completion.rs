//! Chat completion request and response as the cache sees them

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Conversation plus the sampling parameters that change the answer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn builder() -> LlmRequestBuilder {
        LlmRequestBuilder::default()
    }

    /// User turns joined by newlines; this is the text the cache embeds
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// SHA-256 over every non-user turn with its position and role
    ///
    /// `None` when the conversation holds only user turns.
    pub fn context_digest(&self) -> Option<String> {
        let mut hasher = Sha256::new();
        let mut any = false;

        for (position, message) in self.messages.iter().enumerate() {
            if message.role == MessageRole::User {
                continue;
            }
            any = true;
            hasher.update(position.to_le_bytes());
            hasher.update(message.role.as_str().as_bytes());
            hasher.update([0]);
            hasher.update((message.content.len() as u64).to_le_bytes());
            hasher.update(message.content.as_bytes());
        }

        any.then(|| hex::encode(hasher.finalize()))
    }
}

#[derive(Debug, Default)]
pub struct LlmRequestBuilder {
    request: LlmRequest,
}

impl LlmRequestBuilder {
    pub fn message(mut self, message: Message) -> Self {
        self.request.messages.push(message);
        self
    }

    pub fn system(self, content: impl Into<String>) -> Self {
        self.message(Message::system(content))
    }

    pub fn user(self, content: impl Into<String>) -> Self {
        self.message(Message::user(content))
    }

    pub fn assistant(self, content: impl Into<String>) -> Self {
        self.message(Message::assistant(content))
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.request.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.request.max_tokens = Some(max_tokens);
        self
    }

    pub fn build(self) -> LlmRequest {
        self.request
    }
}

/// Provider answer; only the assistant text is cached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub model: String,
    pub message: Message,
}

impl LlmResponse {
    pub fn new(model: impl Into<String>, message: Message) -> Self {
        Self {
            model: model.into(),
            message,
        }
    }

    pub fn content(&self) -> &str {
        &self.message.content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_sampling_parameters() {
        let request = LlmRequest::builder()
            .system("You are terse")
            .user("Hello!")
            .temperature(0.2)
            .max_tokens(64)
            .build();

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(64));
    }

    #[test]
    fn test_user_text_skips_other_roles() {
        let request = LlmRequest::builder()
            .system("system prompt")
            .user("first")
            .assistant("reply")
            .user("second")
            .build();

        assert_eq!(request.user_text(), "first\nsecond");
    }

    #[test]
    fn test_context_digest_covers_non_user_turns() {
        let french = LlmRequest::builder()
            .system("Answer in French")
            .user("Say hello")
            .build();
        let english = LlmRequest::builder()
            .system("Answer in English")
            .user("Say hello")
            .build();
        let reworded = LlmRequest::builder()
            .system("Answer in French")
            .user("Greet me")
            .build();

        assert_ne!(french.context_digest(), english.context_digest());
        assert_eq!(french.context_digest(), reworded.context_digest());
        assert_eq!(french.context_digest().map(|d| d.len()), Some(64));
        assert_eq!(LlmRequest::builder().user("Say hello").build().context_digest(), None);
    }

    #[test]
    fn test_context_digest_depends_on_turn_order() {
        let before = LlmRequest::builder()
            .assistant("Earlier reply")
            .user("Go on")
            .build();
        let after = LlmRequest::builder()
            .user("Go on")
            .assistant("Earlier reply")
            .build();

        assert_ne!(before.context_digest(), after.context_digest());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Message::assistant("Hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"Hi"}"#);
    }

    #[test]
    fn test_response_content() {
        let response = LlmResponse::new("gpt-4.1", Message::assistant("cached answer"));
        assert_eq!(response.content(), "cached answer");
    }
}
