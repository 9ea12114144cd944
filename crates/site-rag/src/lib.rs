//! site-rag: retrieval-augmented question answering over crawled website content
//!
//! Crawled pages are chunked and indexed in a vector store. Questions are answered
//! by retrieving similar chunks, filtering them with an adaptive similarity
//! threshold, fitting them into a token budget and prompting an LLM to answer only
//! from that context, with source attribution.

pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod orchestrator;
pub mod providers;
pub mod retrieval;
pub mod session;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::RagConfig;
pub use engine::{ProviderHealth, RagEngine, SystemInfo};
pub use error::{Error, Result};
pub use orchestrator::RagOrchestrator;
pub use session::{InFlightGuard, InFlightToken};
pub use types::{
    document::{Chunk, Document},
    query::{validate_question, QuestionRequest},
    response::{AnswerOutcome, AnswerRecord, BuildReport, FeedbackKind, SourceAttribution},
};
