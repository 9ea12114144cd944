//! Similarity-filtered retrieval with adaptive threshold relaxation

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::types::{Candidate, ChunkMetadata, ContextBundle, EmptyReason};

use super::store::KnowledgeStore;

/// Convert an index distance into a similarity in [0, 1]
///
/// `max(0, 1 - distance / scale)` is a lenient linear mapping tuned for
/// cosine distances of small sentence-embedding models.
pub fn similarity_from_distance(distance: f32, scale: f32) -> f32 {
    (1.0 - distance / scale).clamp(0.0, 1.0)
}

/// Configured threshold, or the fallback when it is implausibly high
pub fn effective_threshold(config: &RetrievalConfig) -> f32 {
    if config.similarity_threshold > config.max_sane_threshold {
        tracing::warn!(
            "Similarity threshold {} looks misconfigured, using {}",
            config.similarity_threshold,
            config.fallback_threshold
        );
        config.fallback_threshold
    } else {
        config.similarity_threshold
    }
}

/// Keep candidates at or above `threshold`, preserving order
pub fn filter_by_threshold(candidates: &[Candidate], threshold: f32) -> Vec<Candidate> {
    candidates
        .iter()
        .filter(|c| c.similarity >= threshold)
        .cloned()
        .collect()
}

/// Retriever over a knowledge store
pub struct Retriever {
    store: Arc<KnowledgeStore>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a new retriever
    pub fn new(store: Arc<KnowledgeStore>, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    /// Retrieval settings in use
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Underlying knowledge store
    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Retrieve attributed context for a query
    ///
    /// An empty, unreachable or unmatched store yields an empty bundle carrying the
    /// reason. A malformed index response is an error.
    pub async fn retrieve(&self, query: &str) -> Result<ContextBundle> {
        let count = match self.store.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Knowledge store unavailable: {}", e);
                return Ok(ContextBundle::empty(EmptyReason::StoreUnavailable));
            }
        };

        if count == 0 {
            tracing::info!("Knowledge store is empty");
            return Ok(ContextBundle::empty(EmptyReason::EmptyStore));
        }

        let k = self.config.max_retrieved_docs.min(count);
        let result = match self.store.query(query, k).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Knowledge store query failed: {}", e);
                return Ok(ContextBundle::empty(EmptyReason::StoreUnavailable));
            }
        };

        if result.is_empty() {
            return Ok(ContextBundle::empty(EmptyReason::NoMatches));
        }

        if result.texts.len() < result.ids.len() {
            return Err(Error::vector_db(format!(
                "Malformed query result: {} ids but {} texts",
                result.ids.len(),
                result.texts.len()
            )));
        }

        let mut candidates = Vec::with_capacity(result.len());
        for (i, id) in result.ids.iter().enumerate() {
            // a row without a distance has no similarity and is never used
            let Some(&distance) = result.distances.get(i) else {
                continue;
            };
            if !distance.is_finite() {
                continue;
            }

            let metadata = result
                .metadatas
                .get(i)
                .map(ChunkMetadata::from_map)
                .unwrap_or_else(|| ChunkMetadata::from_map(&Default::default()));
            let similarity = similarity_from_distance(distance, self.config.distance_scale);

            tracing::debug!(
                "Candidate {}: distance {:.3}, similarity {:.3}",
                id,
                distance,
                similarity
            );

            candidates.push(Candidate {
                id: id.clone(),
                content: result.texts[i].clone(),
                source_url: metadata.source_url.clone(),
                title: metadata.title.clone(),
                metadata,
                distance,
                similarity,
            });
        }

        let threshold = effective_threshold(&self.config);
        let mut kept = filter_by_threshold(&candidates, threshold);

        if kept.is_empty() && threshold > self.config.relaxed_threshold {
            tracing::info!(
                "No candidates above {:.2}, relaxing threshold to {:.2}",
                threshold,
                self.config.relaxed_threshold
            );
            kept = filter_by_threshold(&candidates, self.config.relaxed_threshold);
        }

        let bundle = ContextBundle::from_candidates(kept);
        tracing::info!(
            "Retrieved {} candidates for query (relevance {:.2})",
            bundle.candidates.len(),
            bundle.relevance
        );
        Ok(bundle)
    }
}
