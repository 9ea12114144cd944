//! Token budgeting of retrieved context

use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;
use crate::providers::TokenCounter;
use crate::types::response::CONTEXT_SEPARATOR;

/// Tokens per word when no tokenizer is available
const TOKENS_PER_WORD: f64 = 1.3;
/// Characters per token for the slice used when the tokenizer fails mid-truncation
const CHARS_PER_TOKEN: usize = 4;

/// Fits context into a token budget without splitting source units
#[derive(Clone, Default)]
pub struct ContextBudgeter {
    tokenizer: Option<Arc<dyn TokenCounter>>,
}

impl ContextBudgeter {
    /// Create a budgeter; without a tokenizer counts are approximated from words
    pub fn new(tokenizer: Option<Arc<dyn TokenCounter>>) -> Self {
        Self { tokenizer }
    }

    /// Name of the counting method in use
    pub fn counter_name(&self) -> &str {
        self.tokenizer
            .as_ref()
            .map(|t| t.name())
            .unwrap_or("word-approximation")
    }

    /// Token count of `text`
    pub fn count_tokens(&self, text: &str) -> usize {
        if let Some(tokenizer) = &self.tokenizer {
            match tokenizer.count(text) {
                Ok(count) => return count,
                Err(e) => tracing::debug!("Tokenizer failed, approximating: {}", e),
            }
        }
        approximate_tokens(text)
    }

    /// Keep the longest prefix of whole source units that fits `max_tokens`
    ///
    /// A unit is never split: if not even the first one fits, the result is empty.
    /// Only when the tokenizer fails mid-truncation are the first `max_tokens * 4`
    /// characters returned instead.
    pub fn truncate(&self, context: &str, max_tokens: usize) -> String {
        match self.try_truncate(context, max_tokens) {
            Ok(kept) => kept,
            Err(e) => {
                tracing::warn!("Truncation failed ({}), slicing context", e);
                context.chars().take(max_tokens * CHARS_PER_TOKEN).collect()
            }
        }
    }

    fn try_truncate(&self, context: &str, max_tokens: usize) -> Result<String> {
        if self.try_count(context)? <= max_tokens {
            return Ok(context.to_string());
        }

        let mut kept = String::new();
        for unit in context.split(CONTEXT_SEPARATOR) {
            let candidate = if kept.is_empty() {
                unit.to_string()
            } else {
                format!("{}{}{}", kept, CONTEXT_SEPARATOR, unit)
            };
            if self.try_count(&candidate)? > max_tokens {
                break;
            }
            kept = candidate;
        }

        if kept.is_empty() {
            tracing::warn!("No whole source fits in {} tokens, dropping context", max_tokens);
        } else {
            tracing::debug!(
                "Truncated context from {} to {} characters",
                context.len(),
                kept.len()
            );
        }
        Ok(kept)
    }

    fn try_count(&self, text: &str) -> Result<usize> {
        match &self.tokenizer {
            Some(tokenizer) => tokenizer.count(text),
            None => Ok(approximate_tokens(text)),
        }
    }
}

/// `words * 1.3`
pub fn approximate_tokens(text: &str) -> usize {
    (text.unicode_words().count() as f64 * TOKENS_PER_WORD) as usize
}
