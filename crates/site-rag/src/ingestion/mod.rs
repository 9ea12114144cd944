//! Knowledge-base ingestion: chunking and batched indexing of crawler output

mod builder;
mod chunker;

pub use builder::{load_documents, KnowledgeBaseBuilder};
pub use chunker::TextChunker;
