//! LLM provider trait for chat-style completions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A two-turn chat request: grounding instruction plus user turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System-role instruction
    pub system: String,
    /// User-role message
    pub user: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum output tokens
    pub max_tokens: u32,
}

/// Text produced by the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Total tokens billed for the request, 0 when the provider does not report usage
    pub tokens_used: u32,
}

/// Trait for LLM-based text generation
///
/// Implementations:
/// - `OpenAiLlm`: OpenAI chat completions
/// - `OllamaLlm`: Local Ollama server
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
