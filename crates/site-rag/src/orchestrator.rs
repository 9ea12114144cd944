//! Question answering state machine: retrieve, generate, log
//!
//! ```text
//! Retrieving --context--> Generating --> Done
//!     |  ^
//!     |  +-- empty or failed, attempts left
//!     +----- empty, no attempts left --> NoContextTerminal
//!     +----- failed, no attempts left --> Failed
//! ```

use std::sync::Arc;
use std::time::Instant;

use crate::config::AssistantConfig;
use crate::error::{Error, Result};
use crate::generation::{AnswerGenerator, PromptBuilder};
use crate::retrieval::Retriever;
use crate::session::{question_key, InFlightToken};
use crate::storage::ConversationLog;
use crate::types::{
    AnswerOutcome, AnswerRecord, ContextBundle, EmptyReason, FeedbackKind, QuestionRequest,
};

enum State {
    Retrieving { attempt: u32 },
    Generating { attempt: u32, bundle: ContextBundle },
    NoContextTerminal { attempt: u32, reason: Option<EmptyReason> },
    Failed { attempt: u32, error: Error },
    Done(AnswerRecord),
}

/// Drives one question through retrieval and generation
pub struct RagOrchestrator {
    retriever: Arc<Retriever>,
    generator: Arc<AnswerGenerator>,
    log: Option<Arc<dyn ConversationLog>>,
    max_attempts: u32,
    assistant: AssistantConfig,
}

impl RagOrchestrator {
    /// Create a new orchestrator
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<AnswerGenerator>,
        max_attempts: u32,
        assistant: AssistantConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            log: None,
            max_attempts: max_attempts.max(1),
            assistant,
        }
    }

    /// Log answered questions that carry a session id
    pub fn with_log(mut self, log: Arc<dyn ConversationLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Maximum attempts per question
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Answer a question reserved by `token`
    ///
    /// Always returns a well-formed record: an answer, the fixed no-context
    /// guidance, or the fixed technical-error apology.
    pub async fn ask(&self, request: &QuestionRequest, token: &InFlightToken) -> AnswerRecord {
        if token.key() != question_key(&request.query) {
            tracing::warn!("In-flight token does not match the submitted question");
        }

        let start = Instant::now();
        let mut state = State::Retrieving { attempt: 1 };

        loop {
            state = match state {
                State::Retrieving { attempt } => {
                    tracing::info!("Attempt {}/{} for query: {}", attempt, self.max_attempts, request.query);
                    self.retrieve(request, attempt).await
                }
                State::Generating { attempt, bundle } => {
                    State::Done(self.generate(request, attempt, bundle, start).await)
                }
                State::NoContextTerminal { attempt, reason } => {
                    tracing::info!("No relevant context after {} attempts ({:?})", attempt, reason);
                    return self.no_context_record(request, attempt, reason, start);
                }
                State::Failed { attempt, error } => {
                    tracing::error!("Giving up after {} attempts: {}", attempt, error);
                    return self.technical_error_record(request, attempt, &error, start);
                }
                State::Done(record) => return record,
            };
        }
    }

    async fn retrieve(&self, request: &QuestionRequest, attempt: u32) -> State {
        let last = attempt >= self.max_attempts;

        match self.retriever.retrieve(&request.query).await {
            Ok(bundle) if !bundle.is_empty() => State::Generating { attempt, bundle },
            Ok(bundle) if last => State::NoContextTerminal {
                attempt,
                reason: bundle.empty_reason,
            },
            Ok(_) => {
                // identical re-query; only helps when the index is non-deterministic
                tracing::warn!("No context found on attempt {}, trying again", attempt);
                State::Retrieving { attempt: attempt + 1 }
            }
            Err(error) if last => State::Failed { attempt, error },
            Err(error) => {
                tracing::warn!("Attempt {} failed: {}", attempt, error);
                State::Retrieving { attempt: attempt + 1 }
            }
        }
    }

    async fn generate(
        &self,
        request: &QuestionRequest,
        attempt: u32,
        bundle: ContextBundle,
        start: Instant,
    ) -> AnswerRecord {
        let result = self
            .generator
            .generate(&request.query, &bundle.context, &bundle.candidates)
            .await;
        let response_time = start.elapsed().as_secs_f64();
        let outcome = if result.generated {
            AnswerOutcome::Answered
        } else {
            AnswerOutcome::GenerationFailed
        };

        let mut record = AnswerRecord {
            query: request.query.clone(),
            response: result.answer,
            relevance_score: bundle.relevance,
            response_time,
            context_length: result.context_used,
            tokens_used: result.tokens_used,
            num_sources: if result.generated { bundle.candidates.len() } else { 0 },
            sources: result.sources,
            conversation_id: None,
            outcome,
            attempts: attempt,
        };

        record.conversation_id = self.log_exchange(request, &record).await;
        tracing::info!("Response generated in {:.2}s", response_time);
        record
    }

    /// Best-effort conversation logging; failures are swallowed
    async fn log_exchange(&self, request: &QuestionRequest, record: &AnswerRecord) -> Option<i64> {
        let log = self.log.as_ref()?;
        let session_id = request.session_id.as_deref()?;
        let source_urls: Vec<String> = record.sources.iter().map(|s| s.url.clone()).collect();

        match log
            .log_conversation(
                session_id,
                &record.query,
                &record.response,
                &source_urls,
                record.relevance_score,
                record.response_time,
            )
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Error logging conversation: {}", e);
                None
            }
        }
    }

    fn no_context_record(
        &self,
        request: &QuestionRequest,
        attempt: u32,
        reason: Option<EmptyReason>,
        start: Instant,
    ) -> AnswerRecord {
        AnswerRecord {
            query: request.query.clone(),
            response: PromptBuilder::no_context_message(&self.assistant),
            sources: Vec::new(),
            relevance_score: 0.0,
            response_time: start.elapsed().as_secs_f64(),
            context_length: 0,
            tokens_used: 0,
            num_sources: 0,
            conversation_id: None,
            outcome: AnswerOutcome::NoContext { reason },
            attempts: attempt,
        }
    }

    fn technical_error_record(
        &self,
        request: &QuestionRequest,
        attempt: u32,
        error: &Error,
        start: Instant,
    ) -> AnswerRecord {
        AnswerRecord {
            query: request.query.clone(),
            response: PromptBuilder::technical_error_message(&self.assistant),
            sources: Vec::new(),
            relevance_score: 0.0,
            response_time: start.elapsed().as_secs_f64(),
            context_length: 0,
            tokens_used: 0,
            num_sources: 0,
            conversation_id: None,
            outcome: AnswerOutcome::TechnicalError {
                message: error.to_string(),
            },
            attempts: attempt,
        }
    }

    /// Record feedback on a logged answer
    pub async fn record_feedback(
        &self,
        conversation_id: i64,
        kind: FeedbackKind,
        text: Option<&str>,
    ) -> Result<()> {
        let log = self
            .log
            .as_ref()
            .ok_or_else(|| Error::database("No conversation log configured"))?;
        log.log_feedback(conversation_id, kind, text).await
    }
}
