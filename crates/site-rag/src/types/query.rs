//! Question request types and caller-side validation

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Minimum question length after trimming
pub const MIN_QUESTION_CHARS: usize = 3;
/// Maximum question length
pub const MAX_QUESTION_CHARS: usize = 500;

/// A question submitted to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRequest {
    /// The question to answer
    pub query: String,
    /// Session to log the exchange under; no logging when absent
    #[serde(default)]
    pub session_id: Option<String>,
}

impl QuestionRequest {
    /// Create a request without a session
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: None,
        }
    }

    /// Log the exchange under the given session
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Generate a fresh session id
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn symbols_only() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^a-zA-Z0-9\s]*$").expect("static regex"))
}

/// Validate a question before it is submitted
pub fn validate_question(question: &str) -> Result<()> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("Please enter a question".to_string()));
    }
    if trimmed.chars().count() < MIN_QUESTION_CHARS {
        return Err(Error::InvalidInput(format!(
            "Question too short (minimum {} characters)",
            MIN_QUESTION_CHARS
        )));
    }
    if question.chars().count() > MAX_QUESTION_CHARS {
        return Err(Error::InvalidInput(format!(
            "Question too long (maximum {} characters)",
            MAX_QUESTION_CHARS
        )));
    }
    if symbols_only().is_match(question) {
        return Err(Error::InvalidInput(
            "Please enter a meaningful question".to_string(),
        ));
    }
    Ok(())
}
