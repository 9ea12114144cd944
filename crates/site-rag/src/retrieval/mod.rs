//! Retrieval: knowledge store, similarity filtering and context budgeting

pub mod budget;
pub mod retriever;
pub mod store;

pub use budget::ContextBudgeter;
pub use retriever::{effective_threshold, similarity_from_distance, Retriever};
pub use store::{BatchOutcome, KnowledgeStore, ProgressFn};
