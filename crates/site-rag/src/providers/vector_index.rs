//! Vector index trait for storing and searching chunk embeddings

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// A chunk with its embedding, ready for insertion
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Deterministic chunk id; re-inserting an id overwrites it
    pub id: String,
    /// Chunk text
    pub text: String,
    /// Flat chunk metadata
    pub metadata: HashMap<String, serde_json::Value>,
    /// Embedding vector
    pub embedding: Vec<f32>,
}

/// Nearest neighbours of one query, best match first
///
/// The vectors are parallel. An index may report fewer distances than ids;
/// rows without a distance carry no similarity and are ignored downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub texts: Vec<String>,
    pub metadatas: Vec<HashMap<String, serde_json::Value>>,
    /// Lower is more similar, roughly in [0, inf)
    pub distances: Vec<f32>,
}

impl QueryResult {
    /// Number of rows returned
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no rows were returned
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Trait for vector storage and similarity search
///
/// Implementations:
/// - `HnswVectorIndex`: Local HNSW index persisted in SQLite
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite entries by id
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Find the `k` entries nearest to `embedding`
    async fn query(&self, embedding: &[f32], k: usize) -> Result<QueryResult>;

    /// Number of stored entries
    async fn count(&self) -> Result<usize>;

    /// Check if the index is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
