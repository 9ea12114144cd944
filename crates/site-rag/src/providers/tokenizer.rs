//! Token counting for context budgeting

use std::path::Path;

use crate::error::{Error, Result};

/// Counts tokens the way the generation model would
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`
    fn count(&self, text: &str) -> Result<usize>;

    /// Get counter name for logging
    fn name(&self) -> &str;
}

/// Token counter backed by a HuggingFace `tokenizer.json`
pub struct HfTokenCounter {
    tokenizer: tokenizers::Tokenizer,
}

impl HfTokenCounter {
    /// Load a tokenizer from a `tokenizer.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            Error::Tokenizer(format!("Failed to load tokenizer {}: {}", path.display(), e))
        })?;
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> Result<usize> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(encoding.len())
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}
