//! Completion provider contract

mod completion;
mod provider;

pub use completion::{LlmRequest, LlmRequestBuilder, LlmResponse, Message, MessageRole};
pub use provider::LlmProvider;

#[cfg(test)]
pub use provider::mock::MockLlmProvider;
