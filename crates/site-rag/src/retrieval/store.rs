//! Knowledge store: embeds chunk text and keeps it in a vector index

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, IndexEntry, QueryResult, VectorIndex};
use crate::types::Chunk;

/// Progress callback: completed fraction in [0, 1] and a status message
pub type ProgressFn<'a> = &'a (dyn Fn(f32, &str) + Send + Sync);

/// Outcome of a batched insertion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Batches written
    pub batches_ok: usize,
    /// Batches that failed and were skipped
    pub batches_failed: usize,
    /// Chunks written
    pub chunks_indexed: usize,
}

/// Embedding function plus vector index
pub struct KnowledgeStore {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl KnowledgeStore {
    /// Create a new store
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Embed and insert-or-overwrite the given rows
    pub async fn upsert(
        &self,
        ids: &[String],
        texts: &[String],
        metadatas: &[HashMap<String, serde_json::Value>],
    ) -> Result<()> {
        if ids.len() != texts.len() || ids.len() != metadatas.len() {
            return Err(Error::vector_db(format!(
                "Mismatched upsert columns: {} ids, {} texts, {} metadatas",
                ids.len(),
                texts.len(),
                metadatas.len()
            )));
        }
        if ids.is_empty() {
            return Ok(());
        }

        let embeddings = self.embedder.embed_batch(texts).await?;
        if embeddings.len() != texts.len() {
            return Err(Error::embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        let entries: Vec<IndexEntry> = ids
            .iter()
            .zip(texts)
            .zip(metadatas)
            .zip(embeddings)
            .map(|(((id, text), metadata), embedding)| IndexEntry {
                id: id.clone(),
                text: text.clone(),
                metadata: metadata.clone(),
                embedding,
            })
            .collect();

        self.index.upsert(&entries).await
    }

    /// Nearest `k` rows to `text`, best match first
    pub async fn query(&self, text: &str, k: usize) -> Result<QueryResult> {
        let embedding = self.embedder.embed(text).await?;
        self.index.query(&embedding, k).await
    }

    /// Number of indexed chunks
    pub async fn count(&self) -> Result<usize> {
        self.index.count().await
    }

    /// Insert chunks in fixed-size batches; a failed batch is logged and skipped
    pub async fn add_chunks_batched(
        &self,
        chunks: &[Chunk],
        batch_size: usize,
        progress: Option<ProgressFn<'_>>,
    ) -> BatchOutcome {
        let batch_size = batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);
        let mut outcome = BatchOutcome::default();

        for (batch_num, batch) in chunks.chunks(batch_size).enumerate() {
            let ids: Vec<String> = batch.iter().map(|c| c.id.clone()).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let metadatas: Vec<_> = batch.iter().map(|c| c.metadata.to_map()).collect();

            match self.upsert(&ids, &texts, &metadatas).await {
                Ok(()) => {
                    outcome.batches_ok += 1;
                    outcome.chunks_indexed += batch.len();
                    tracing::debug!("Indexed batch {}/{}", batch_num + 1, total_batches);
                }
                Err(e) => {
                    outcome.batches_failed += 1;
                    tracing::warn!(
                        "Failed to index batch {}/{} ({} chunks): {}",
                        batch_num + 1,
                        total_batches,
                        batch.len(),
                        e
                    );
                }
            }

            if let Some(progress) = progress {
                let fraction = (batch_num + 1) as f32 / total_batches as f32;
                progress(
                    fraction,
                    &format!("Indexed batch {}/{}", batch_num + 1, total_batches),
                );
            }
        }

        outcome
    }

    /// Embedding provider name
    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// Vector index name
    pub fn index_name(&self) -> &str {
        self.index.name()
    }

    /// Whether the embedding provider answers its health check
    pub async fn embedder_healthy(&self) -> bool {
        self.embedder.health_check().await.unwrap_or_else(|e| {
            tracing::warn!("Embedder health check failed: {}", e);
            false
        })
    }

    /// Whether the vector index answers its health check
    pub async fn index_healthy(&self) -> bool {
        self.index.health_check().await.unwrap_or_else(|e| {
            tracing::warn!("Vector index health check failed: {}", e);
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistanceMetric;
    use crate::providers::HnswVectorIndex;
    use crate::test_support::{FlakyEmbedder, HashEmbedder};
    use crate::types::{Chunk, Document};

    fn chunks(n: usize) -> Vec<Chunk> {
        let doc = Document::new("https://example.com/a", "A", "body");
        let texts = (0..n).map(|i| format!("chunk text number {}", i)).collect();
        Chunk::from_document(0, &doc, texts)
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let index = Arc::new(HnswVectorIndex::in_memory(DistanceMetric::Cosine).unwrap());
        let store = KnowledgeStore::new(Arc::new(HashEmbedder::default()), index);

        let outcome = store.add_chunks_batched(&chunks(3), 50, None).await;
        assert_eq!(outcome.chunks_indexed, 3);
        assert_eq!(store.count().await.unwrap(), 3);

        let result = store.query("chunk text number 1", 3).await.unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.distances[0] < 1e-6);
        assert!(result.ids.contains(&"doc_0_chunk_1".to_string()));
    }

    #[tokio::test]
    async fn test_mismatched_columns_rejected() {
        let index = Arc::new(HnswVectorIndex::in_memory(DistanceMetric::Cosine).unwrap());
        let store = KnowledgeStore::new(Arc::new(HashEmbedder::default()), index);
        let result = store
            .upsert(&["a".to_string()], &[], &[HashMap::new()])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_failed_batch_is_skipped() {
        let index = Arc::new(HnswVectorIndex::in_memory(DistanceMetric::Cosine).unwrap());
        // second embed_batch call fails
        let store = KnowledgeStore::new(Arc::new(FlakyEmbedder::failing_on(1)), index);

        let seen = parking_lot::Mutex::new(Vec::new());
        let progress = |fraction: f32, _msg: &str| seen.lock().push(fraction);
        let outcome = store.add_chunks_batched(&chunks(5), 2, Some(&progress)).await;

        assert_eq!(outcome.batches_ok, 2);
        assert_eq!(outcome.batches_failed, 1);
        assert_eq!(outcome.chunks_indexed, 3);
        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(seen.lock().len(), 3);
        assert_eq!(*seen.lock().last().unwrap(), 1.0);
    }
}
