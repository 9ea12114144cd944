//! Answer generation from retrieved context

pub mod generator;
pub mod prompt;

pub use generator::AnswerGenerator;
pub use prompt::PromptBuilder;
