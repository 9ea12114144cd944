//! Provider doubles for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use site_rag::error::{Error, Result};
use site_rag::providers::{
    Completion, CompletionRequest, EmbeddingProvider, IndexEntry, LlmProvider, QueryResult,
    VectorIndex,
};

/// Embeds every text as the same unit vector
pub struct ConstantEmbedder;

#[async_trait]
impl EmbeddingProvider for ConstantEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0])
    }

    fn dimensions(&self) -> usize {
        3
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Index holding fixed rows at fixed distances
#[derive(Default)]
pub struct FixedIndex {
    rows: Vec<(String, String, HashMap<String, serde_json::Value>, f32)>,
    pub queries: AtomicUsize,
}

impl FixedIndex {
    pub fn with_row(mut self, id: &str, text: &str, title: &str, url: &str, distance: f32) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("title".to_string(), serde_json::json!(title));
        metadata.insert("source_url".to_string(), serde_json::json!(url));
        self.rows.push((id.to_string(), text.to_string(), metadata, distance));
        self
    }
}

#[async_trait]
impl VectorIndex for FixedIndex {
    async fn upsert(&self, _entries: &[IndexEntry]) -> Result<()> {
        Err(Error::vector_db("read-only index"))
    }

    async fn query(&self, _embedding: &[f32], k: usize) -> Result<QueryResult> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut result = QueryResult::default();
        for (id, text, metadata, distance) in self.rows.iter().take(k) {
            result.ids.push(id.clone());
            result.texts.push(text.clone());
            result.metadatas.push(metadata.clone());
            result.distances.push(*distance);
        }
        Ok(result)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.rows.len())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Index whose count is non-zero but whose queries return nothing
pub struct SilentIndex {
    count: usize,
    pub queries: AtomicUsize,
}

impl SilentIndex {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            queries: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorIndex for SilentIndex {
    async fn upsert(&self, _entries: &[IndexEntry]) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _embedding: &[f32], _k: usize) -> Result<QueryResult> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(QueryResult::default())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.count)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "silent"
    }
}

/// LLM that answers with a fixed text and remembers prompts
pub struct EchoLlm {
    answer: String,
    pub prompts: Mutex<Vec<CompletionRequest>>,
}

impl EchoLlm {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LlmProvider for EchoLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.prompts.lock().push(request.clone());
        Ok(Completion {
            text: self.answer.clone(),
            tokens_used: 120,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        "echo-1"
    }
}
