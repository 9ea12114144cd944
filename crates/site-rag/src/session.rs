//! Caller-side guard against submitting the same question twice
//!
//! The orchestrator never keeps this state. Callers own an [`InFlightGuard`],
//! obtain an [`InFlightToken`] before asking and hand it back when done.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Where a question is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionState {
    /// An answer is being produced
    InFlight,
    /// An answer has been delivered
    Answered,
}

/// Proof that the caller reserved a question key
#[derive(Debug, PartialEq, Eq)]
pub struct InFlightToken {
    key: String,
}

impl InFlightToken {
    /// Normalized question key this token reserves
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Tracks in-flight and answered questions for one caller
#[derive(Debug, Default)]
pub struct InFlightGuard {
    states: HashMap<String, QuestionState>,
}

impl InFlightGuard {
    /// Create an empty guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a question; fails if it is already in flight or answered
    pub fn begin(&mut self, question: &str) -> Result<InFlightToken> {
        let key = question_key(question);
        match self.states.get(&key) {
            Some(QuestionState::InFlight) => Err(Error::DuplicateQuestion(format!(
                "'{}' is already being answered",
                question.trim()
            ))),
            Some(QuestionState::Answered) => Err(Error::DuplicateQuestion(format!(
                "'{}' has already been answered",
                question.trim()
            ))),
            None => {
                self.states.insert(key.clone(), QuestionState::InFlight);
                Ok(InFlightToken { key })
            }
        }
    }

    /// Mark the reserved question as answered
    pub fn finish(&mut self, token: InFlightToken) {
        self.states.insert(token.key, QuestionState::Answered);
    }

    /// Release the reservation so the question may be asked again
    pub fn release(&mut self, token: InFlightToken) {
        self.states.remove(&token.key);
    }

    /// Current state of a question, if known
    pub fn state(&self, question: &str) -> Option<QuestionState> {
        self.states.get(&question_key(question)).copied()
    }

    /// Forget every question
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

/// Normalize a question into its guard key
pub fn question_key(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_in_flight_rejected() {
        let mut guard = InFlightGuard::new();
        let token = guard.begin("What are the fees?").unwrap();
        assert!(matches!(
            guard.begin("  what are   the FEES? "),
            Err(Error::DuplicateQuestion(_))
        ));
        assert_eq!(guard.state("What are the fees?"), Some(QuestionState::InFlight));

        guard.finish(token);
        assert_eq!(guard.state("What are the fees?"), Some(QuestionState::Answered));
        assert!(guard.begin("What are the fees?").is_err());
    }

    #[test]
    fn test_release_allows_retry() {
        let mut guard = InFlightGuard::new();
        let token = guard.begin("fees").unwrap();
        guard.release(token);
        assert!(guard.state("fees").is_none());
        assert!(guard.begin("fees").is_ok());
    }
}
