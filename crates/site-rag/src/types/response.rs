//! Per-query result types: candidates, context bundles, answers

use serde::{Deserialize, Serialize};

use super::document::ChunkMetadata;

/// Separator placed between source units in a context bundle
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// A chunk returned by the knowledge store for one query, with its derived score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Chunk id in the index
    pub id: String,
    /// Chunk text
    pub content: String,
    /// Inherited document metadata
    pub metadata: ChunkMetadata,
    /// Raw distance reported by the index
    pub distance: f32,
    /// Similarity derived from the distance, in [0, 1]
    pub similarity: f32,
    /// Source page URL
    pub source_url: String,
    /// Source page title
    pub title: String,
}

impl Candidate {
    /// Render this candidate as one context unit
    pub fn context_unit(&self) -> String {
        format!("[Source: {}]\n{}\n", self.title, self.content)
    }
}

/// Why retrieval produced no context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    /// Nothing has been indexed yet
    EmptyStore,
    /// The store could not be counted or queried
    StoreUnavailable,
    /// The store answered but returned no rows
    NoMatches,
    /// Rows came back but none survived filtering, even after relaxation
    BelowThreshold,
}

/// Ordered, attributed context assembled for one query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Concatenated `[Source: ..]` units joined by [`CONTEXT_SEPARATOR`]
    pub context: String,
    /// Surviving candidates, best match first
    pub candidates: Vec<Candidate>,
    /// Mean similarity of the candidates (0.0 when empty)
    pub relevance: f32,
    /// Set when the bundle is empty
    pub empty_reason: Option<EmptyReason>,
}

impl ContextBundle {
    /// An empty bundle carrying the reason it is empty
    pub fn empty(reason: EmptyReason) -> Self {
        Self {
            empty_reason: Some(reason),
            ..Default::default()
        }
    }

    /// Assemble a bundle from surviving candidates
    pub fn from_candidates(candidates: Vec<Candidate>) -> Self {
        if candidates.is_empty() {
            return Self::empty(EmptyReason::BelowThreshold);
        }

        let context = candidates
            .iter()
            .map(Candidate::context_unit)
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        let relevance =
            candidates.iter().map(|c| c.similarity).sum::<f32>() / candidates.len() as f32;

        Self {
            context,
            candidates,
            relevance,
            empty_reason: None,
        }
    }

    /// Whether there is any context to generate from
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

/// A source attributed in an answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceAttribution {
    /// Page title
    pub title: String,
    /// Page URL
    pub url: String,
    /// Similarity of the chunk that supplied it
    pub relevance: f32,
}

impl From<&Candidate> for SourceAttribution {
    fn from(candidate: &Candidate) -> Self {
        Self {
            title: candidate.title.clone(),
            url: candidate.source_url.clone(),
            relevance: candidate.similarity,
        }
    }
}

/// Output of the answer generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    /// Generated answer text
    pub answer: String,
    /// Deduplicated sources
    pub sources: Vec<SourceAttribution>,
    /// Characters of context sent after budgeting
    pub context_used: usize,
    /// Tokens reported by the provider
    pub tokens_used: u32,
    /// Whether the answer came from the provider rather than the fixed apology
    pub generated: bool,
}

/// How a question was resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// An answer was generated from retrieved context
    Answered,
    /// Context was found but the LLM call failed; the response is an apology
    GenerationFailed,
    /// Every attempt came back without context
    NoContext { reason: Option<EmptyReason> },
    /// The last attempt failed with an error
    TechnicalError { message: String },
}

/// Final per-question result handed to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// The question
    pub query: String,
    /// Answer, guidance or apology text
    pub response: String,
    /// Attributed sources
    pub sources: Vec<SourceAttribution>,
    /// Mean similarity of the context used
    pub relevance_score: f32,
    /// Wall-clock seconds spent on the question
    pub response_time: f64,
    /// Characters of context sent to the LLM
    pub context_length: usize,
    /// Tokens reported by the provider
    pub tokens_used: u32,
    /// Number of retrieved candidates
    pub num_sources: usize,
    /// Conversation log id, when the exchange was logged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,
    /// How the question was resolved
    pub outcome: AnswerOutcome,
    /// Attempts made before resolving
    pub attempts: u32,
}

impl AnswerRecord {
    /// Whether an answer was generated
    pub fn is_answered(&self) -> bool {
        matches!(self.outcome, AnswerOutcome::Answered)
    }

    /// Sources formatted for display, at most three
    pub fn format_sources(&self) -> String {
        if self.sources.is_empty() {
            return "No sources".to_string();
        }

        self.sources
            .iter()
            .take(3)
            .enumerate()
            .map(|(i, source)| {
                let title: String = source.title.chars().take(50).collect();
                let relevance = (source.relevance * 100.0) as u32;
                if source.url.is_empty() {
                    format!("{}. {} ({}% relevant)", i + 1, title, relevance)
                } else {
                    format!("{}. [{}]({}) ({}% relevant)", i + 1, title, source.url, relevance)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Response time formatted for display
    pub fn format_response_time(&self) -> String {
        format_response_time(self.response_time)
    }

    /// Quality grade from relevance and latency
    pub fn quality(&self) -> ResponseQuality {
        ResponseQuality::grade(self.relevance_score, self.response_time)
    }
}

/// `"850ms"` under one second, `"2.3s"` otherwise
pub fn format_response_time(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{}ms", (seconds * 1000.0) as u64)
    } else {
        format!("{:.1}s", seconds)
    }
}

/// Coarse answer quality grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ResponseQuality {
    /// Grade a response by relevance and latency
    pub fn grade(relevance: f32, response_time: f64) -> Self {
        if relevance >= 0.8 && response_time < 3.0 {
            Self::Excellent
        } else if relevance >= 0.6 && response_time < 5.0 {
            Self::Good
        } else if relevance >= 0.4 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl std::fmt::Display for ResponseQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
        };
        f.write_str(label)
    }
}

/// User feedback on a logged answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    ThumbsUp,
    ThumbsDown,
}

impl FeedbackKind {
    /// Value stored in the feedback table
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThumbsUp => "thumbs_up",
            Self::ThumbsDown => "thumbs_down",
        }
    }
}

impl std::str::FromStr for FeedbackKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" | "thumbs_up" | "+1" => Ok(Self::ThumbsUp),
            "down" | "thumbs_down" | "-1" => Ok(Self::ThumbsDown),
            other => Err(crate::error::Error::InvalidInput(format!(
                "Unknown feedback kind: {}",
                other
            ))),
        }
    }
}

/// Outcome of a knowledge-base build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    /// Documents supplied
    pub documents_seen: usize,
    /// Documents that produced at least one chunk
    pub documents_indexed: usize,
    /// Documents skipped as too short or empty
    pub documents_too_short: usize,
    /// Documents skipped as duplicate content
    pub documents_duplicate: usize,
    /// Chunks created
    pub chunks_created: usize,
    /// Chunks written to the index
    pub chunks_indexed: usize,
    /// Batches written
    pub batches_ok: usize,
    /// Batches that failed and were skipped
    pub batches_failed: usize,
}

impl BuildReport {
    /// A build succeeds when at least one chunk was indexed
    pub fn success(&self) -> bool {
        self.chunks_indexed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, similarity: f32) -> Candidate {
        Candidate {
            id: format!("{}_id", title),
            content: format!("{} body", title),
            metadata: ChunkMetadata::default(),
            distance: 0.0,
            similarity,
            source_url: format!("https://example.com/{}", title),
            title: title.to_string(),
        }
    }

    #[test]
    fn test_bundle_joins_units_and_averages() {
        let bundle = ContextBundle::from_candidates(vec![candidate("a", 0.8), candidate("b", 0.4)]);
        assert_eq!(bundle.context, "[Source: a]\na body\n\n---\n[Source: b]\nb body\n");
        assert!((bundle.relevance - 0.6).abs() < 1e-6);
        assert!(bundle.empty_reason.is_none());
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = ContextBundle::from_candidates(Vec::new());
        assert!(bundle.is_empty());
        assert_eq!(bundle.relevance, 0.0);
        assert_eq!(bundle.empty_reason, Some(EmptyReason::BelowThreshold));
    }

    #[test]
    fn test_response_time_format() {
        assert_eq!(format_response_time(0.25), "250ms");
        assert_eq!(format_response_time(2.34), "2.3s");
    }

    #[test]
    fn test_quality_grades() {
        assert_eq!(ResponseQuality::grade(0.9, 1.0), ResponseQuality::Excellent);
        assert_eq!(ResponseQuality::grade(0.9, 4.0), ResponseQuality::Good);
        assert_eq!(ResponseQuality::grade(0.5, 10.0), ResponseQuality::Fair);
        assert_eq!(ResponseQuality::grade(0.1, 0.5), ResponseQuality::Poor);
    }

    #[test]
    fn test_feedback_parse() {
        assert_eq!("up".parse::<FeedbackKind>().unwrap(), FeedbackKind::ThumbsUp);
        assert_eq!("thumbs_down".parse::<FeedbackKind>().unwrap(), FeedbackKind::ThumbsDown);
        assert!("meh".parse::<FeedbackKind>().is_err());
    }
}
