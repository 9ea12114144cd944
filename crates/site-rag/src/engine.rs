//! RAG engine: wires providers, store, builder and orchestrator from configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::config::{ProviderBackend, RagConfig};
use crate::error::{Error, Result};
use crate::generation::AnswerGenerator;
use crate::ingestion::{load_documents, KnowledgeBaseBuilder};
use crate::orchestrator::RagOrchestrator;
use crate::providers::{
    ollama::{OllamaEmbedder, OllamaLlm},
    openai::{OpenAiEmbedder, OpenAiLlm},
    EmbeddingProvider, HfTokenCounter, HnswVectorIndex, LlmProvider, TokenCounter, VectorIndex,
};
use crate::retrieval::{effective_threshold, ContextBudgeter, KnowledgeStore, ProgressFn, Retriever};
use crate::session::InFlightToken;
use crate::storage::{Analytics, ConversationDb, ConversationEntry, ConversationLog};
use crate::types::{AnswerRecord, BuildReport, Document, FeedbackKind, QuestionRequest};

/// Snapshot of the running system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Indexed chunks
    pub knowledge_base_size: usize,
    /// Embedding model identifier
    pub embedding_model: String,
    /// Generation model identifier
    pub llm_model: String,
    /// Chunk size in characters
    pub chunk_size: usize,
    /// Candidates requested per query
    pub max_retrieved_docs: usize,
    /// Threshold actually applied in the first filtering pass
    pub similarity_threshold: f32,
    /// Token counting method
    pub token_counter: String,
    /// Whether the conversation database is reachable
    pub database_connected: bool,
    /// Usage statistics, when the database is reachable
    pub analytics: Option<Analytics>,
    /// Reachability of the backing services
    pub health: ProviderHealth,
}

/// Health of each provider, as reported by its own check
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderHealth {
    pub embeddings: bool,
    pub llm: bool,
    pub vector_index: bool,
}

impl ProviderHealth {
    /// Whether every provider answered its health check
    pub fn all_healthy(&self) -> bool {
        self.embeddings && self.llm && self.vector_index
    }
}

/// The assembled question-answering system
pub struct RagEngine {
    config: RagConfig,
    store: Arc<KnowledgeStore>,
    builder: KnowledgeBaseBuilder,
    orchestrator: RagOrchestrator,
    llm: Arc<dyn LlmProvider>,
    db: Option<Arc<ConversationDb>>,
    token_counter: String,
}

impl RagEngine {
    /// Create the engine and its providers from configuration
    ///
    /// Missing credentials for a configured backend are a configuration error.
    /// An unavailable conversation database or tokenizer only degrades the engine.
    pub fn from_config(config: RagConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            "Initializing RAG engine (llm: {:?}/{}, embeddings: {:?}/{})",
            config.llm.backend,
            config.llm.model,
            config.embeddings.backend,
            config.embeddings.model
        );

        let embedder: Arc<dyn EmbeddingProvider> = match config.embeddings.backend {
            ProviderBackend::OpenAi => Arc::new(OpenAiEmbedder::new(&config.llm, &config.embeddings)?),
            ProviderBackend::Ollama => Arc::new(OllamaEmbedder::new(&config.llm, &config.embeddings)?),
        };

        let llm: Arc<dyn LlmProvider> = match config.llm.backend {
            ProviderBackend::OpenAi => Arc::new(OpenAiLlm::new(&config.llm)?),
            ProviderBackend::Ollama => Arc::new(OllamaLlm::new(&config.llm)?),
        };

        let index: Arc<dyn VectorIndex> = Arc::new(HnswVectorIndex::from_config(&config.vector_db)?);
        tracing::info!("Vector index opened at {}", config.vector_db.storage_path.display());

        let tokenizer: Option<Arc<dyn TokenCounter>> = match &config.llm.tokenizer_path {
            Some(path) => match HfTokenCounter::from_file(path) {
                Ok(counter) => Some(Arc::new(counter)),
                Err(e) => {
                    tracing::warn!("Tokenizer unavailable, approximating token counts: {}", e);
                    None
                }
            },
            None => None,
        };

        let db = match ConversationDb::new(&config.database.path) {
            Ok(db) => Some(Arc::new(db)),
            Err(e) => {
                tracing::warn!("Conversation database unavailable, logging disabled: {}", e);
                None
            }
        };

        Ok(Self::from_parts(config, embedder, index, llm, tokenizer, db))
    }

    /// Assemble the engine from already constructed providers
    pub fn from_parts(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmProvider>,
        tokenizer: Option<Arc<dyn TokenCounter>>,
        db: Option<Arc<ConversationDb>>,
    ) -> Self {
        let store = Arc::new(KnowledgeStore::new(embedder, index));
        let builder = KnowledgeBaseBuilder::new(Arc::clone(&store), &config.chunking);
        let retriever = Arc::new(Retriever::new(Arc::clone(&store), config.retrieval.clone()));

        let budgeter = ContextBudgeter::new(tokenizer);
        let token_counter = budgeter.counter_name().to_string();
        let generator = Arc::new(AnswerGenerator::new(
            Arc::clone(&llm),
            budgeter,
            &config.llm,
            config.retrieval.context_max_tokens,
            config.assistant.clone(),
        ));

        let mut orchestrator = RagOrchestrator::new(
            retriever,
            generator,
            config.orchestrator.max_attempts,
            config.assistant.clone(),
        );
        if let Some(db) = &db {
            orchestrator = orchestrator.with_log(Arc::clone(db) as Arc<dyn ConversationLog>);
        }

        Self {
            config,
            store,
            builder,
            orchestrator,
            llm,
            db,
            token_counter,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Index `documents` and record them in the document registry
    pub async fn build_knowledge_base(
        &self,
        documents: &[Document],
        progress: Option<ProgressFn<'_>>,
    ) -> BuildReport {
        let report = self.builder.build(documents, progress).await;

        if report.success() {
            if let Some(db) = &self.db {
                let db = Arc::clone(db);
                let documents = documents.to_vec();
                let saved = tokio::task::spawn_blocking(move || db.save_documents(&documents))
                    .await
                    .map_err(|e| Error::internal(format!("Task join error: {}", e)))
                    .and_then(|r| r);
                if let Err(e) = saved {
                    tracing::warn!("Failed to save document registry: {}", e);
                }
            }
        }
        report
    }

    /// Read crawler output from a JSON file and build from it
    pub async fn load_from_file(
        &self,
        path: impl AsRef<Path>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<BuildReport> {
        let documents = load_documents(path)?;
        if documents.is_empty() {
            tracing::warn!("No documents found in data file");
        }
        Ok(self.build_knowledge_base(&documents, progress).await)
    }

    /// Answer a question reserved by `token`
    pub async fn ask(&self, request: &QuestionRequest, token: &InFlightToken) -> AnswerRecord {
        self.orchestrator.ask(request, token).await
    }

    /// Record feedback on a logged answer
    pub async fn record_feedback(
        &self,
        conversation_id: i64,
        kind: FeedbackKind,
        text: Option<&str>,
    ) -> Result<()> {
        self.orchestrator.record_feedback(conversation_id, kind, text).await
    }

    /// Last `limit` exchanges of a session, oldest first
    pub async fn conversation_history(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>> {
        let db = self
            .db
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| Error::database("Conversation database unavailable"))?;
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || db.conversation_history(&session_id, limit))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    /// Run every provider's health check
    pub async fn health(&self) -> ProviderHealth {
        let (embeddings, vector_index, llm) = tokio::join!(
            self.store.embedder_healthy(),
            self.store.index_healthy(),
            self.llm.health_check()
        );
        ProviderHealth {
            embeddings,
            vector_index,
            llm: llm.unwrap_or_else(|e| {
                tracing::warn!("LLM health check failed: {}", e);
                false
            }),
        }
    }

    /// Sizes, models, provider health and usage statistics
    pub async fn system_info(&self) -> SystemInfo {
        let knowledge_base_size = self.store.count().await.unwrap_or_else(|e| {
            tracing::warn!("Could not count indexed chunks: {}", e);
            0
        });

        let (database_connected, analytics) = match &self.db {
            Some(db) => {
                let db = Arc::clone(db);
                tokio::task::spawn_blocking(move || (db.is_connected(), db.analytics().ok()))
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!("Database status task failed: {}", e);
                        (false, None)
                    })
            }
            None => (false, None),
        };

        SystemInfo {
            knowledge_base_size,
            embedding_model: self.config.embeddings.model.clone(),
            llm_model: self.llm.model().to_string(),
            chunk_size: self.config.chunking.chunk_size,
            max_retrieved_docs: self.config.retrieval.max_retrieved_docs,
            similarity_threshold: effective_threshold(&self.config.retrieval),
            token_counter: self.token_counter.clone(),
            database_connected,
            analytics,
            health: self.health().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistanceMetric, LlmConfig};
    use crate::session::InFlightGuard;
    use crate::test_support::{HashEmbedder, MockLlm};

    fn engine() -> RagEngine {
        let mut config = RagConfig::default();
        config.chunking.chunk_size = 300;
        config.chunking.chunk_overlap = 50;
        config.chunking.min_chunk_size = 20;

        RagEngine::from_parts(
            config,
            Arc::new(HashEmbedder::default()),
            Arc::new(HnswVectorIndex::in_memory(DistanceMetric::Cosine).unwrap()),
            Arc::new(MockLlm::answering("Savings accounts have no monthly fee.")),
            None,
            Some(Arc::new(ConversationDb::in_memory().unwrap())),
        )
    }

    fn page(url: &str, title: &str, sentence: &str) -> Document {
        Document::new(url, title, std::iter::repeat(sentence).take(12).collect::<Vec<_>>().join(" "))
    }

    #[test]
    fn test_openai_backend_without_key_is_config_error() {
        let mut config = RagConfig::default();
        config.llm = LlmConfig {
            api_key: None,
            ..Default::default()
        };
        config.embeddings.backend = ProviderBackend::Ollama;
        let dir = tempfile::tempdir().unwrap();
        config.vector_db.storage_path = dir.path().join("vectors.db");
        config.database.path = dir.path().join("conversations.db");

        assert!(matches!(RagEngine::from_config(config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_build_ask_and_log() {
        let engine = engine();
        let docs = vec![
            page("https://bank.test/savings", "Savings", "Savings accounts have no monthly fee at all."),
            page("https://bank.test/cards", "Cards", "Debit cards work at every ATM in the country."),
        ];

        let progress_calls = parking_lot::Mutex::new(0usize);
        let progress = |_: f32, _: &str| *progress_calls.lock() += 1;
        let report = engine.build_knowledge_base(&docs, Some(&progress)).await;
        assert!(report.success());
        assert!(*progress_calls.lock() >= docs.len());

        let mut guard = InFlightGuard::new();
        let request = QuestionRequest::new("savings accounts monthly fee").with_session("s1");
        let token = guard.begin(&request.query).unwrap();
        let record = engine.ask(&request, &token).await;
        guard.finish(token);

        assert!(record.is_answered());
        assert!(record.conversation_id.is_some());
        assert_eq!(record.sources[0].url, "https://bank.test/savings");
        assert_eq!(engine.conversation_history("s1", 10).await.unwrap().len(), 1);

        let info = engine.system_info().await;
        assert_eq!(info.knowledge_base_size, report.chunks_indexed);
        assert_eq!(info.llm_model, "mock-model");
        assert_eq!(info.token_counter, "word-approximation");
        assert!(info.database_connected);
        assert!(info.health.all_healthy());
        let analytics = info.analytics.unwrap();
        assert_eq!(analytics.total_content, 2);
        assert_eq!(analytics.total_conversations, 1);
    }

    #[tokio::test]
    async fn test_system_info_reports_unhealthy_llm() {
        let engine = RagEngine::from_parts(
            RagConfig::default(),
            Arc::new(HashEmbedder::default()),
            Arc::new(HnswVectorIndex::in_memory(DistanceMetric::Cosine).unwrap()),
            Arc::new(MockLlm::failing()),
            None,
            None,
        );

        let info = engine.system_info().await;
        assert_eq!(
            info.health,
            ProviderHealth {
                embeddings: true,
                llm: false,
                vector_index: true,
            }
        );
        assert!(!info.health.all_healthy());
        assert!(!info.database_connected);
        assert!(info.analytics.is_none());
        assert!(engine.conversation_history("s1", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_load_from_missing_file_is_error() {
        let engine = engine();
        assert!(engine.load_from_file("/nonexistent/scraped.json", None).await.is_err());
    }
}
