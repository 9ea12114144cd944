//! Answer generator: budget the context, prompt the model, attribute sources

use std::sync::Arc;

use crate::config::{AssistantConfig, LlmConfig};
use crate::providers::{CompletionRequest, LlmProvider};
use crate::retrieval::ContextBudgeter;
use crate::types::{AnswerResult, Candidate, SourceAttribution};

use super::prompt::PromptBuilder;

/// Generates grounded answers; provider failures become a fixed apology
pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
    budgeter: ContextBudgeter,
    temperature: f32,
    max_tokens: u32,
    max_context_tokens: usize,
    assistant: AssistantConfig,
}

impl AnswerGenerator {
    /// Create a new generator
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        budgeter: ContextBudgeter,
        llm_config: &LlmConfig,
        max_context_tokens: usize,
        assistant: AssistantConfig,
    ) -> Self {
        Self {
            llm,
            budgeter,
            temperature: llm_config.temperature,
            max_tokens: llm_config.max_tokens,
            max_context_tokens,
            assistant,
        }
    }

    /// Model answering the questions
    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Generate an answer for `query` from `context`
    pub async fn generate(&self, query: &str, context: &str, candidates: &[Candidate]) -> AnswerResult {
        let context = self.budgeter.truncate(context, self.max_context_tokens);
        tracing::debug!(
            "Context budgeted to {} tokens ({})",
            self.budgeter.count_tokens(&context),
            self.budgeter.counter_name()
        );

        let request = CompletionRequest {
            system: PromptBuilder::system_instruction(&self.assistant),
            user: PromptBuilder::user_turn(&self.assistant, &context, query),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        match self.llm.complete(&request).await {
            Ok(completion) => {
                tracing::info!(
                    "Generated answer with {} ({} tokens)",
                    self.llm.model(),
                    completion.tokens_used
                );
                AnswerResult {
                    answer: completion.text,
                    sources: attribute_sources(candidates),
                    context_used: context.chars().count(),
                    tokens_used: completion.tokens_used,
                    generated: true,
                }
            }
            Err(e) => {
                tracing::error!("Answer generation failed: {}", e);
                AnswerResult {
                    answer: PromptBuilder::generation_apology(&self.assistant),
                    sources: Vec::new(),
                    context_used: 0,
                    tokens_used: 0,
                    generated: false,
                }
            }
        }
    }
}

/// Sources of the candidates, deduplicated by (title, url, relevance), in order
pub fn attribute_sources(candidates: &[Candidate]) -> Vec<SourceAttribution> {
    let mut sources: Vec<SourceAttribution> = Vec::new();
    for source in candidates.iter().map(SourceAttribution::from) {
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{candidate, MockLlm};

    fn generator(llm: Arc<MockLlm>) -> AnswerGenerator {
        AnswerGenerator::new(
            llm,
            ContextBudgeter::default(),
            &LlmConfig::default(),
            2000,
            AssistantConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_generate_answer_with_sources() {
        let llm = Arc::new(MockLlm::answering("There are no monthly fees."));
        let candidates = vec![candidate("c0", "Fees", 0.8), candidate("c1", "Fees", 0.8)];

        let result = generator(Arc::clone(&llm))
            .generate("fees?", "[Source: Fees]\nNo fees.\n", &candidates)
            .await;

        assert!(result.generated);
        assert_eq!(result.answer, "There are no monthly fees.");
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.tokens_used, 42);
        assert_eq!(result.context_used, "[Source: Fees]\nNo fees.\n".chars().count());

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, 0.7);
        assert_eq!(requests[0].max_tokens, 1000);
        assert!(requests[0].user.contains("fees?"));
    }

    #[tokio::test]
    async fn test_provider_failure_is_apology() {
        let llm = Arc::new(MockLlm::failing());
        let result = generator(llm)
            .generate("fees?", "ctx", &[candidate("c0", "Fees", 0.8)])
            .await;

        assert!(!result.generated);
        assert!(result.answer.starts_with("I apologize"));
        assert!(result.sources.is_empty());
        assert_eq!(result.tokens_used, 0);
    }

    #[test]
    fn test_sources_dedup_keeps_distinct_relevance() {
        let candidates = vec![
            candidate("c0", "Fees", 0.8),
            candidate("c1", "Fees", 0.6),
            candidate("c2", "Fees", 0.8),
        ];
        let sources = attribute_sources(&candidates);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].relevance, 0.8);
        assert_eq!(sources[1].relevance, 0.6);
    }
}
