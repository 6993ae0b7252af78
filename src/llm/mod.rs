//! LLM completion clients.

pub mod anthropic;

pub use anthropic::AnthropicClient;

use crate::error::LlmError;
use async_trait::async_trait;

/// A text-in, text-out completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier recorded in snapshot metadata.
    fn model_name(&self) -> &str;

    /// Send one prompt and return the response text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}
