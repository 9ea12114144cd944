//! Hand-written provider doubles shared by unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::{
    Completion, CompletionRequest, EmbeddingProvider, IndexEntry, LlmProvider, QueryResult,
    VectorIndex,
};
use crate::storage::ConversationLog;
use crate::types::{Candidate, ChunkMetadata, FeedbackKind};

/// Bag-of-words embedder: each lowercase word bumps one hashed dimension
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimensions: 256 }
    }
}

impl HashEmbedder {
    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Embedder whose n-th batch call (0-based) fails
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn failing_on(fail_on: usize) -> Self {
        Self {
            inner: HashEmbedder::default(),
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_on {
            return Err(Error::embedding("embedding service unavailable"));
        }
        Ok(texts.iter().map(|t| self.inner.vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Vector index that returns a fixed result regardless of the query
pub struct ScriptedIndex {
    result: QueryResult,
    /// `None` means the index is unreachable
    count: Option<usize>,
    malformed_first: usize,
    query_calls: AtomicUsize,
    requested_k: Arc<Mutex<Option<usize>>>,
}

impl ScriptedIndex {
    pub fn with_result(result: QueryResult) -> Self {
        Self {
            count: Some(result.len()),
            result,
            malformed_first: 0,
            query_calls: AtomicUsize::new(0),
            requested_k: Arc::new(Mutex::new(None)),
        }
    }

    pub fn empty() -> Self {
        Self::with_result(QueryResult::default())
    }

    pub fn unavailable() -> Self {
        Self {
            count: None,
            ..Self::empty()
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// The first `n` queries return texts missing for every id
    pub fn malformed_first(mut self, n: usize) -> Self {
        self.malformed_first = n;
        self
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn requested_k(&self) -> Arc<Mutex<Option<usize>>> {
        Arc::clone(&self.requested_k)
    }
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn upsert(&self, _entries: &[IndexEntry]) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _embedding: &[f32], k: usize) -> Result<QueryResult> {
        *self.requested_k.lock() = Some(k);
        let call = self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.count.is_none() {
            return Err(Error::vector_db("index unreachable"));
        }

        let mut result = self.result.clone();
        if call < self.malformed_first {
            result.texts.clear();
        }
        Ok(result)
    }

    async fn count(&self) -> Result<usize> {
        self.count.ok_or_else(|| Error::vector_db("index unreachable"))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.count.is_some())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Append one row to a query result
pub fn row(result: &mut QueryResult, id: &str, title: &str, distance: f32) {
    let mut metadata = HashMap::new();
    metadata.insert("title".to_string(), serde_json::json!(title));
    metadata.insert(
        "source_url".to_string(),
        serde_json::json!(format!("https://example.com/{}", title.to_lowercase().replace(' ', "-"))),
    );
    result.ids.push(id.to_string());
    result.texts.push(format!("text of {}", id));
    result.metadatas.push(metadata);
    result.distances.push(distance);
}

/// A candidate with the given title and similarity
pub fn candidate(id: &str, title: &str, similarity: f32) -> Candidate {
    Candidate {
        id: id.to_string(),
        content: format!("text of {}", id),
        metadata: ChunkMetadata::default(),
        distance: 0.0,
        similarity,
        source_url: format!("https://example.com/{}", title.to_lowercase()),
        title: title.to_string(),
    }
}

/// LLM double that records requests
pub struct MockLlm {
    answer: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlm {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.requests.lock().push(request.clone());
        match &self.answer {
            Some(text) => Ok(Completion {
                text: text.clone(),
                tokens_used: 42,
            }),
            None => Err(Error::llm("rate limited")),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.answer.is_some())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

/// Conversation log that always fails
pub struct FailingLog;

#[async_trait]
impl ConversationLog for FailingLog {
    async fn log_conversation(
        &self,
        _session_id: &str,
        _question: &str,
        _response: &str,
        _source_urls: &[String],
        _relevance_score: f32,
        _response_time: f64,
    ) -> Result<i64> {
        Err(Error::database("disk full"))
    }

    async fn log_feedback(
        &self,
        _conversation_id: i64,
        _kind: FeedbackKind,
        _text: Option<&str>,
    ) -> Result<()> {
        Err(Error::database("disk full"))
    }
}
