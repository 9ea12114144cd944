//! Knowledge-base build: filter documents, chunk them, index in batches

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::retrieval::{KnowledgeStore, ProgressFn};
use crate::types::{BuildReport, Chunk, Document};

use super::chunker::TextChunker;

/// Builds the knowledge base from crawler output
pub struct KnowledgeBaseBuilder {
    chunker: TextChunker,
    store: Arc<KnowledgeStore>,
    min_document_length: usize,
    batch_size: usize,
}

impl KnowledgeBaseBuilder {
    /// Create a new builder
    pub fn new(store: Arc<KnowledgeStore>, config: &ChunkingConfig) -> Self {
        Self {
            chunker: TextChunker::from_config(config),
            store,
            min_document_length: config.min_document_length,
            batch_size: config.batch_size,
        }
    }

    /// Chunk every eligible document
    ///
    /// Chunk ids derive from the document's position in `documents`, so the same
    /// input always yields the same ids.
    pub fn prepare_chunks(
        &self,
        documents: &[Document],
        progress: Option<ProgressFn<'_>>,
    ) -> (Vec<Chunk>, BuildReport) {
        let mut report = BuildReport {
            documents_seen: documents.len(),
            ..Default::default()
        };
        let mut seen_hashes = HashSet::new();
        let mut chunks = Vec::new();
        let total = documents.len();

        for (doc_index, doc) in documents.iter().enumerate() {
            if let Some(progress) = progress {
                progress(
                    (doc_index + 1) as f32 / total as f32,
                    &format!("Processing document {}/{}", doc_index + 1, total),
                );
            }

            if doc.content.chars().count() < self.min_document_length {
                report.documents_too_short += 1;
                continue;
            }

            if !seen_hashes.insert(doc.hash_or_compute()) {
                tracing::debug!("Skipping duplicate content at {}", doc.url);
                report.documents_duplicate += 1;
                continue;
            }

            let texts = self.chunker.chunk(&doc.content);
            if texts.is_empty() {
                report.documents_too_short += 1;
                continue;
            }

            report.documents_indexed += 1;
            chunks.extend(Chunk::from_document(doc_index, doc, texts));
        }

        report.chunks_created = chunks.len();
        (chunks, report)
    }

    /// Chunk and index `documents`; failed batches are skipped
    pub async fn build(&self, documents: &[Document], progress: Option<ProgressFn<'_>>) -> BuildReport {
        if documents.is_empty() {
            tracing::warn!("No documents provided for knowledge base");
            return BuildReport::default();
        }

        tracing::info!("Building knowledge base from {} documents", documents.len());
        let (chunks, mut report) = self.prepare_chunks(documents, progress);
        tracing::info!("Created {} knowledge chunks", chunks.len());

        let outcome = self
            .store
            .add_chunks_batched(&chunks, self.batch_size, progress)
            .await;

        report.chunks_indexed = outcome.chunks_indexed;
        report.batches_ok = outcome.batches_ok;
        report.batches_failed = outcome.batches_failed;

        if report.batches_failed > 0 {
            tracing::warn!(
                "Knowledge base built with {} failed batches ({} of {} chunks indexed)",
                report.batches_failed,
                report.chunks_indexed,
                report.chunks_created
            );
        } else {
            tracing::info!("Knowledge base built: {} chunks indexed", report.chunks_indexed);
        }
        report
    }
}

/// Read a JSON array of documents
pub fn load_documents(path: impl AsRef<Path>) -> Result<Vec<Document>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::InvalidInput(format!("Data file not found: {}", path.display())));
    }
    let raw = std::fs::read_to_string(path)?;
    let documents: Vec<Document> = serde_json::from_str(&raw)?;
    Ok(documents)
}
