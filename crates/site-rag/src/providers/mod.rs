//! Capability-provider abstractions for embeddings, LLM calls, vector storage and tokenization
//!
//! The pipeline only talks to these traits, so backends (OpenAI, Ollama, the local
//! HNSW index) can be swapped from configuration.

pub mod embedding;
pub mod llm;
pub mod local;
pub mod ollama;
pub mod openai;
pub mod tokenizer;
pub mod vector_index;

pub use embedding::EmbeddingProvider;
pub use llm::{Completion, CompletionRequest, LlmProvider};
pub use local::HnswVectorIndex;
pub use tokenizer::{HfTokenCounter, TokenCounter};
pub use vector_index::{IndexEntry, QueryResult, VectorIndex};
