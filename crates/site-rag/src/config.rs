//! Configuration for the RAG system

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Main RAG system configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagConfig {
    /// Assistant persona configuration
    #[serde(default)]
    pub assistant: AssistantConfig,
    /// Chunking and knowledge-base build configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Retrieval and relevance filtering configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Vector index configuration
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    /// Conversation log database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Answer orchestration configuration
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file
    ///
    /// Missing sections fall back to their defaults. When no API key is set in the
    /// file, `OPENAI_API_KEY` is consulted.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: RagConfig = toml::from_str(&raw)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = RagConfig::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Fill credentials from the environment when not configured explicitly
    pub fn apply_env(&mut self) {
        if self.llm.api_key.as_deref().map_or(true, str::is_empty) {
            self.llm.api_key = std::env::var(OPENAI_API_KEY_ENV).ok().filter(|k| !k.is_empty());
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(Error::config("chunking.chunk_size must be greater than zero"));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(Error::config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }
        if chunking.batch_size == 0 {
            return Err(Error::config("chunking.batch_size must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(Error::config(format!(
                "retrieval.similarity_threshold ({}) must be within [0, 1]",
                self.retrieval.similarity_threshold
            )));
        }
        if self.retrieval.distance_scale <= 0.0 {
            return Err(Error::config("retrieval.distance_scale must be positive"));
        }
        if self.vector_db.hnsw_m == 0 || self.vector_db.hnsw_ef_search == 0 {
            return Err(Error::config("vector_db.hnsw_m and hnsw_ef_search must be greater than zero"));
        }
        if self.orchestrator.max_attempts == 0 {
            return Err(Error::config("orchestrator.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Assistant persona used in the grounding instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Organization whose website content is being answered from
    pub organization: String,
    /// Where users should go when the knowledge base has no answer
    pub support_hint: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            organization: "the company".to_string(),
            support_hint: "contact customer support".to_string(),
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
    /// Chunks no longer than this are dropped
    pub min_chunk_size: usize,
    /// Documents shorter than this are not indexed
    pub min_document_length: usize,
    /// Chunks inserted per vector index batch
    pub batch_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 100,
            min_document_length: 150,
            batch_size: 50,
        }
    }
}

/// Default similarity threshold, also used when the configured one is unreasonably high
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;
/// Thresholds above this are treated as misconfiguration
pub const MAX_SANE_THRESHOLD: f32 = 0.8;
/// Threshold used for the relaxed second filtering pass
pub const RELAXED_THRESHOLD: f32 = 0.1;
/// Divisor of the linear distance-to-similarity conversion, tuned for MiniLM-style cosine distances
pub const DISTANCE_SCALE: f32 = 1.5;

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum number of chunks to pull from the index per query
    pub max_retrieved_docs: usize,
    /// Minimum similarity for a candidate to be kept
    pub similarity_threshold: f32,
    /// `similarity = max(0, 1 - distance / distance_scale)`
    #[serde(default = "default_distance_scale")]
    pub distance_scale: f32,
    /// Configured thresholds above this are replaced by `fallback_threshold`
    #[serde(default = "default_max_sane_threshold")]
    pub max_sane_threshold: f32,
    /// Replacement for a misconfigured threshold
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f32,
    /// Threshold of the second pass when the first pass keeps nothing
    #[serde(default = "default_relaxed_threshold")]
    pub relaxed_threshold: f32,
    /// Token budget for the context handed to the LLM
    #[serde(default = "default_context_max_tokens")]
    pub context_max_tokens: usize,
}

fn default_distance_scale() -> f32 { DISTANCE_SCALE }
fn default_max_sane_threshold() -> f32 { MAX_SANE_THRESHOLD }
fn default_fallback_threshold() -> f32 { DEFAULT_SIMILARITY_THRESHOLD }
fn default_relaxed_threshold() -> f32 { RELAXED_THRESHOLD }
fn default_context_max_tokens() -> usize { 2000 }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_retrieved_docs: 5,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            distance_scale: DISTANCE_SCALE,
            max_sane_threshold: MAX_SANE_THRESHOLD,
            fallback_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            relaxed_threshold: RELAXED_THRESHOLD,
            context_max_tokens: 2000,
        }
    }
}

/// Which service answers prompts / produces embeddings
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    /// OpenAI HTTP API (requires an API key)
    #[default]
    OpenAi,
    /// Local Ollama server
    Ollama,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which backend generates answers
    #[serde(default)]
    pub backend: ProviderBackend,
    /// Generation model name
    pub model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// OpenAI API key (falls back to `OPENAI_API_KEY`)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL
    pub openai_base_url: String,
    /// Ollama base URL
    pub ollama_base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Provider-level retries for failed HTTP requests
    pub max_retries: u32,
    /// Optional HuggingFace `tokenizer.json` used for token budgeting
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: ProviderBackend::OpenAi,
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            timeout_secs: 60,
            max_retries: 1,
            tokenizer_path: None,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which backend produces embeddings
    #[serde(default = "default_embedding_backend")]
    pub backend: ProviderBackend,
    /// Embedding model identifier
    pub model: String,
    /// Embedding dimensions (384 for all-minilm)
    pub dimensions: usize,
}

fn default_embedding_backend() -> ProviderBackend {
    ProviderBackend::Ollama
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: ProviderBackend::Ollama,
            model: "all-minilm".to_string(),
            dimensions: 384,
        }
    }
}

/// Distance metric used by the local vector index
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, in [0, 2]
    #[default]
    Cosine,
    /// L2 distance, in [0, inf)
    Euclidean,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    /// SQLite file persisting the vectors the HNSW graph is rebuilt from
    pub storage_path: PathBuf,
    /// Distance metric
    #[serde(default)]
    pub distance_metric: DistanceMetric,
    /// HNSW M parameter (connections per node)
    #[serde(default = "default_hnsw_m")]
    pub hnsw_m: usize,
    /// HNSW ef_construction parameter
    #[serde(default = "default_hnsw_ef_construction")]
    pub hnsw_ef_construction: usize,
    /// HNSW ef_search parameter
    #[serde(default = "default_hnsw_ef_search")]
    pub hnsw_ef_search: usize,
    /// Expected number of vectors; the graph grows past it with degraded recall
    #[serde(default = "default_hnsw_max_elements")]
    pub hnsw_max_elements: usize,
}

fn default_hnsw_m() -> usize { 16 }
fn default_hnsw_ef_construction() -> usize { 200 }
fn default_hnsw_ef_search() -> usize { 100 }
fn default_hnsw_max_elements() -> usize { 100_000 }

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            storage_path: data_dir().join("vectors.db"),
            distance_metric: DistanceMetric::Cosine,
            hnsw_m: default_hnsw_m(),
            hnsw_ef_construction: default_hnsw_ef_construction(),
            hnsw_ef_search: default_hnsw_ef_search(),
            hnsw_max_elements: default_hnsw_max_elements(),
        }
    }
}

/// Conversation log database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite conversation log
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("conversations.db"),
        }
    }
}

/// Answer orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on retrieve/generate attempts per question
    pub max_attempts: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("site-rag")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.retrieval.max_retrieved_docs, 5);
        assert_eq!(config.orchestrator.max_attempts, 3);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut config = RagConfig::default();
        config.retrieval.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let raw = r#"
            [chunking]
            chunk_size = 500
            chunk_overlap = 50
            min_chunk_size = 20
            min_document_length = 100
            batch_size = 10

            [retrieval]
            max_retrieved_docs = 8
            similarity_threshold = 0.9
        "#;
        let config: RagConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.retrieval.max_retrieved_docs, 8);
        assert_eq!(config.retrieval.distance_scale, DISTANCE_SCALE);
        assert_eq!(config.retrieval.context_max_tokens, 2000);
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.vector_db.hnsw_m, 16);
        assert_eq!(config.vector_db.hnsw_ef_search, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site-rag.toml");
        std::fs::write(
            &path,
            "[assistant]\norganization = \"Acme\"\nsupport_hint = \"email help@acme.test\"\n",
        )
        .unwrap();

        let config = RagConfig::from_file(&path).unwrap();
        assert_eq!(config.assistant.organization, "Acme");
        assert_eq!(config.chunking.batch_size, 50);
    }
}
