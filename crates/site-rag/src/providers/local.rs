//! Local persistent vector index
//!
//! Nearest-neighbour search runs on an in-memory `hnsw_rs` graph. SQLite keeps
//! the text, metadata and embedding of every chunk id and is what the graph is
//! rebuilt from when the index is opened.
//!
//! `hnsw_rs` cannot delete points. Overwriting an id inserts a new point and
//! marks the old one stale; stale points are filtered from results and dropped
//! by a rebuild once they exceed a tenth of the live entries.

use async_trait::async_trait;
use hnsw_rs::prelude::*;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::{DistanceMetric, VectorDbConfig};
use crate::error::{Error, Result};

use super::vector_index::{IndexEntry, QueryResult, VectorIndex};

const MAX_LAYER: usize = 16;
const STALE_REBUILD_RATIO: f64 = 0.10;

/// HNSW tuning parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Connections per node
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Expected number of vectors
    pub max_elements: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 100,
            max_elements: 100_000,
        }
    }
}

impl From<&VectorDbConfig> for HnswParams {
    fn from(config: &VectorDbConfig) -> Self {
        Self {
            m: config.hnsw_m,
            ef_construction: config.hnsw_ef_construction,
            ef_search: config.hnsw_ef_search,
            max_elements: config.hnsw_max_elements,
        }
    }
}

enum Graph {
    Cosine(Hnsw<'static, f32, DistCosine>),
    Euclidean(Hnsw<'static, f32, DistL2>),
}

// SAFETY: graphs built with `Hnsw::new` own their points, and hnsw_rs guards
// its layers with internal locks.
unsafe impl Send for Graph {}
unsafe impl Sync for Graph {}

impl Graph {
    fn new(metric: DistanceMetric, params: &HnswParams, capacity: usize) -> Self {
        let max_elements = params.max_elements.max(capacity);
        match metric {
            DistanceMetric::Cosine => Graph::Cosine(Hnsw::new(
                params.m,
                max_elements,
                MAX_LAYER,
                params.ef_construction,
                DistCosine {},
            )),
            DistanceMetric::Euclidean => Graph::Euclidean(Hnsw::new(
                params.m,
                max_elements,
                MAX_LAYER,
                params.ef_construction,
                DistL2 {},
            )),
        }
    }

    fn insert(&self, embedding: &[f32], data_id: usize) {
        match self {
            Graph::Cosine(hnsw) => hnsw.insert_slice((embedding, data_id)),
            Graph::Euclidean(hnsw) => hnsw.insert_slice((embedding, data_id)),
        }
    }

    fn search(&self, embedding: &[f32], k: usize, ef: usize) -> Vec<Neighbour> {
        match self {
            Graph::Cosine(hnsw) => hnsw.search(embedding, k, ef),
            Graph::Euclidean(hnsw) => hnsw.search(embedding, k, ef),
        }
    }
}

/// The graph plus the bookkeeping that maps its points back to chunk ids
struct GraphState {
    graph: Graph,
    /// Chunk id of every inserted point, `None` once superseded
    labels: Vec<Option<String>>,
    live: HashMap<String, usize>,
    stale: usize,
    dimension: Option<usize>,
}

impl GraphState {
    fn new(metric: DistanceMetric, params: &HnswParams, capacity: usize) -> Self {
        Self {
            graph: Graph::new(metric, params, capacity),
            labels: Vec::with_capacity(capacity),
            live: HashMap::with_capacity(capacity),
            stale: 0,
            dimension: None,
        }
    }

    fn insert(&mut self, id: &str, embedding: &[f32]) {
        let data_id = self.labels.len();
        if let Some(previous) = self.live.insert(id.to_string(), data_id) {
            self.labels[previous] = None;
            self.stale += 1;
        }
        self.labels.push(Some(id.to_string()));
        self.dimension.get_or_insert(embedding.len());
        self.graph.insert(embedding, data_id);
    }

    fn needs_rebuild(&self) -> bool {
        !self.live.is_empty() && self.stale as f64 / self.live.len() as f64 > STALE_REBUILD_RATIO
    }
}

/// HNSW vector index persisted in SQLite
pub struct HnswVectorIndex {
    conn: Arc<Mutex<Connection>>,
    state: Arc<RwLock<GraphState>>,
    metric: DistanceMetric,
    params: HnswParams,
}

impl HnswVectorIndex {
    /// Create or open the index at the given path with default HNSW parameters
    pub fn open<P: AsRef<Path>>(path: P, metric: DistanceMetric) -> Result<Self> {
        Self::open_with(path, metric, HnswParams::default())
    }

    /// Create or open the index at the given path
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        metric: DistanceMetric,
        params: HnswParams,
    ) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::vector_db(format!("Failed to open vector index: {}", e)))?;
        Self::from_connection(conn, metric, params)
    }

    /// Create from config
    pub fn from_config(config: &VectorDbConfig) -> Result<Self> {
        Self::open_with(&config.storage_path, config.distance_metric, HnswParams::from(config))
    }

    /// Create an in-memory index (for testing)
    pub fn in_memory(metric: DistanceMetric) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::vector_db(format!("Failed to open in-memory index: {}", e)))?;
        Self::from_connection(conn, metric, HnswParams::default())
    }

    fn from_connection(conn: Connection, metric: DistanceMetric, params: HnswParams) -> Result<Self> {
        migrate(&conn)?;
        let state = load_graph(&conn, metric, &params)?;
        tracing::info!(
            "Vector index ready: {} chunks, {:?} metric, M={}",
            state.live.len(),
            metric,
            params.m
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            state: Arc::new(RwLock::new(state)),
            metric,
            params,
        })
    }

    fn upsert_blocking(
        conn: &Mutex<Connection>,
        state: &RwLock<GraphState>,
        metric: DistanceMetric,
        params: &HnswParams,
        entries: &[IndexEntry],
    ) -> Result<()> {
        let mut graph = state.write();

        let expected = graph
            .dimension
            .or_else(|| entries.first().map(|e| e.embedding.len()));
        for entry in entries {
            if entry.embedding.is_empty() {
                return Err(Error::vector_db(format!("Chunk {} has no embedding", entry.id)));
            }
            if Some(entry.embedding.len()) != expected {
                return Err(Error::vector_db(format!(
                    "Chunk {} has dimension {}, index expects {:?}",
                    entry.id,
                    entry.embedding.len(),
                    expected
                )));
            }
        }

        let mut conn = conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chunk_vectors (id, content, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in entries {
                let metadata = serde_json::to_string(&entry.metadata)?;
                stmt.execute(params![
                    entry.id,
                    entry.text,
                    metadata,
                    encode_vector(&entry.embedding)
                ])?;
            }
        }
        tx.commit()?;

        for entry in entries {
            graph.insert(&entry.id, &entry.embedding);
        }

        if graph.needs_rebuild() {
            tracing::debug!(
                "Rebuilding HNSW graph: {} stale of {} live points",
                graph.stale,
                graph.live.len()
            );
            *graph = load_graph(&conn, metric, params)?;
        }
        Ok(())
    }

    fn query_blocking(
        conn: &Mutex<Connection>,
        state: &RwLock<GraphState>,
        params: &HnswParams,
        embedding: &[f32],
        k: usize,
    ) -> Result<QueryResult> {
        let graph = state.read();
        if graph.live.is_empty() || k == 0 {
            return Ok(QueryResult::default());
        }
        if let Some(dimension) = graph.dimension {
            if dimension != embedding.len() {
                return Err(Error::vector_db(format!(
                    "Query dimension {} does not match index dimension {}",
                    embedding.len(),
                    dimension
                )));
            }
        }

        // over-fetch so stale points do not crowd out live ones
        let request_k = k + graph.stale;
        let ef = params.ef_search.max(request_k);
        let mut hits: Vec<(f32, String)> = graph
            .graph
            .search(embedding, request_k, ef)
            .into_iter()
            .filter(|n| n.distance.is_finite())
            .filter_map(|n| {
                graph
                    .labels
                    .get(n.d_id)
                    .cloned()
                    .flatten()
                    .map(|id| (n.distance, id))
            })
            .collect();
        drop(graph);

        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.truncate(k);

        let conn = conn.lock();
        let mut stmt = conn.prepare("SELECT content, metadata FROM chunk_vectors WHERE id = ?1")?;
        let mut result = QueryResult::default();
        for (distance, id) in hits {
            let row = stmt
                .query_row(params![id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .optional()?;
            let Some((content, metadata)) = row else {
                tracing::warn!("Chunk {} is in the graph but not in storage", id);
                continue;
            };
            let metadata: HashMap<String, serde_json::Value> =
                serde_json::from_str(&metadata).unwrap_or_default();
            result.ids.push(id);
            result.texts.push(content);
            result.metadatas.push(metadata);
            result.distances.push(distance);
        }
        Ok(result)
    }
}

#[async_trait]
impl VectorIndex for HnswVectorIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let state = Arc::clone(&self.state);
        let metric = self.metric;
        let params = self.params;
        let entries = entries.to_vec();
        tokio::task::spawn_blocking(move || {
            Self::upsert_blocking(&conn, &state, metric, &params, &entries)
        })
        .await
        .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<QueryResult> {
        let conn = Arc::clone(&self.conn);
        let state = Arc::clone(&self.state);
        let params = self.params;
        let embedding = embedding.to_vec();
        tokio::task::spawn_blocking(move || {
            Self::query_blocking(&conn, &state, &params, &embedding, k)
        })
        .await
        .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().live.len())
    }

    async fn health_check(&self) -> Result<bool> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            Ok(conn
                .query_row("SELECT COUNT(*) FROM chunk_vectors", [], |row| row.get::<_, i64>(0))
                .is_ok())
        })
        .await
        .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    fn name(&self) -> &str {
        "local-hnsw"
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            metadata TEXT NOT NULL,
            embedding BLOB NOT NULL
        );
        "#,
    )
    .map_err(|e| Error::vector_db(format!("Failed to create vector table: {}", e)))?;
    Ok(())
}

fn load_graph(conn: &Connection, metric: DistanceMetric, params: &HnswParams) -> Result<GraphState> {
    let mut stmt = conn.prepare("SELECT id, embedding FROM chunk_vectors")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut state = GraphState::new(metric, params, rows.len());
    for (id, blob) in rows {
        let embedding = decode_vector(&blob);
        if embedding.is_empty() || state.dimension.is_some_and(|d| d != embedding.len()) {
            tracing::warn!("Skipping chunk {}: stored embedding has dimension {}", id, embedding.len());
            continue;
        }
        state.insert(&id, &embedding);
    }
    Ok(state)
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
