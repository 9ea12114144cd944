//! Core types for the RAG system

pub mod document;
pub mod query;
pub mod response;

pub use document::{Category, Chunk, ChunkMetadata, Document};
pub use query::QuestionRequest;
pub use response::{
    AnswerOutcome, AnswerRecord, AnswerResult, BuildReport, Candidate, ContextBundle,
    EmptyReason, FeedbackKind, SourceAttribution,
};
