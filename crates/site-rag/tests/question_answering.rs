//! End-to-end question answering through the public API

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{ConstantEmbedder, EchoLlm, FixedIndex, SilentIndex};
use site_rag::config::DistanceMetric;
use site_rag::providers::{HnswVectorIndex, VectorIndex};
use site_rag::storage::ConversationDb;
use site_rag::types::EmptyReason;
use site_rag::{AnswerOutcome, Document, InFlightGuard, QuestionRequest, RagConfig, RagEngine};

fn engine_with(index: Arc<dyn VectorIndex>, llm: Arc<EchoLlm>) -> RagEngine {
    RagEngine::from_parts(
        RagConfig::default(),
        Arc::new(ConstantEmbedder),
        index,
        llm,
        None,
        Some(Arc::new(ConversationDb::in_memory().unwrap())),
    )
}

#[tokio::test]
async fn single_close_match_is_answered_with_one_source() {
    let index = Arc::new(FixedIndex::default().with_row(
        "doc_0_chunk_0",
        "Savings accounts carry no monthly maintenance fee.",
        "Savings Account Fees",
        "https://bank.test/savings/fees",
        0.3,
    ));
    let llm = Arc::new(EchoLlm::new("There is no monthly fee on savings accounts."));
    let engine = engine_with(index, Arc::clone(&llm));

    let mut guard = InFlightGuard::new();
    let request = QuestionRequest::new("fees").with_session("demo");
    let token = guard.begin(&request.query).unwrap();
    let record = engine.ask(&request, &token).await;
    guard.finish(token);

    assert_eq!(record.outcome, AnswerOutcome::Answered);
    assert_eq!(record.response, "There is no monthly fee on savings accounts.");
    assert!((record.relevance_score - 0.8).abs() < 1e-6);
    assert_eq!(record.sources.len(), 1);
    assert!((record.sources[0].relevance - 0.8).abs() < 1e-6);
    assert_eq!(record.sources[0].url, "https://bank.test/savings/fees");
    assert_eq!(record.num_sources, 1);
    assert_eq!(record.tokens_used, 120);
    assert!(record.conversation_id.is_some());

    let prompts = llm.prompts.lock();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0]
        .user
        .contains("[Source: Savings Account Fees]\nSavings accounts carry no monthly maintenance fee."));
    assert!(prompts[0].system.contains("ONLY"));
}

#[tokio::test]
async fn weak_matches_survive_through_relaxation() {
    // similarity 1 - 1.2 / 1.5 = 0.2, under the 0.3 threshold but over 0.1
    let index = Arc::new(FixedIndex::default().with_row(
        "doc_0_chunk_0",
        "Cards can be frozen from the app.",
        "Cards",
        "https://bank.test/cards",
        1.2,
    ));
    let engine = engine_with(index, Arc::new(EchoLlm::new("Freeze it in the app.")));

    let mut guard = InFlightGuard::new();
    let request = QuestionRequest::new("lost card");
    let token = guard.begin(&request.query).unwrap();
    let record = engine.ask(&request, &token).await;

    assert!(record.is_answered());
    assert!((record.relevance_score - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn empty_results_stop_after_three_attempts() {
    let index = Arc::new(SilentIndex::new(10));
    let llm = Arc::new(EchoLlm::new("unused"));
    let engine = engine_with(Arc::clone(&index) as Arc<dyn VectorIndex>, Arc::clone(&llm));

    let mut guard = InFlightGuard::new();
    let request = QuestionRequest::new("anything about loans?");
    let token = guard.begin(&request.query).unwrap();
    let record = engine.ask(&request, &token).await;

    assert_eq!(index.queries.load(Ordering::SeqCst), 3);
    assert_eq!(record.attempts, 3);
    assert_eq!(record.relevance_score, 0.0);
    assert!(record.sources.is_empty());
    assert_eq!(
        record.outcome,
        AnswerOutcome::NoContext {
            reason: Some(EmptyReason::NoMatches)
        }
    );
    assert!(llm.prompts.lock().is_empty());
}

#[test]
fn duplicate_submission_is_rejected_by_the_guard() {
    let mut guard = InFlightGuard::new();
    let token = guard.begin("What are the fees?").unwrap();
    assert!(guard.begin("what are the fees?").is_err());
    guard.finish(token);
    assert!(guard.begin("What are the fees?").is_err());
}

#[tokio::test]
async fn rebuilding_the_same_documents_keeps_the_index_size() {
    let dir = tempfile::tempdir().unwrap();
    let index = Arc::new(
        HnswVectorIndex::open(dir.path().join("vectors.db"), DistanceMetric::Cosine).unwrap(),
    );
    let engine = RagEngine::from_parts(
        RagConfig::default(),
        Arc::new(ConstantEmbedder),
        Arc::clone(&index) as Arc<dyn VectorIndex>,
        Arc::new(EchoLlm::new("ok")),
        None,
        Some(Arc::new(ConversationDb::new(dir.path().join("conversations.db")).unwrap())),
    );

    let body = "Our savings account pays interest monthly and has no minimum balance. ".repeat(40);
    let docs = vec![
        Document::new("https://bank.test/savings", "Savings", body.clone()),
        Document::new("https://bank.test/short", "Short", "Too short to index."),
    ];

    let first = engine.build_knowledge_base(&docs, None).await;
    assert!(first.success());
    assert_eq!(first.documents_too_short, 1);

    let info = engine.system_info().await;
    let size = info.knowledge_base_size;
    assert_eq!(size, first.chunks_indexed);

    let second = engine.build_knowledge_base(&docs, None).await;
    assert_eq!(second.chunks_indexed, first.chunks_indexed);
    assert_eq!(engine.system_info().await.knowledge_base_size, size);
    assert_eq!(engine.system_info().await.analytics.unwrap().total_content, 2);
}

#[tokio::test]
async fn loading_crawler_output_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scraped_content.json");
    let body = "Transfers between accounts are free and settle instantly. ".repeat(30);
    let docs = serde_json::json!([
        {
            "url": "https://bank.test/transfers",
            "title": "Transfers",
            "content": body,
            "category": "faq",
            "keywords": ["transfer", "upi"],
            "content_hash": "abc123",
            "length": body.len(),
            "word_count": 240,
            "scraped_at": "2024-05-01T10:00:00"
        }
    ]);
    std::fs::write(&path, serde_json::to_string(&docs).unwrap()).unwrap();

    let index = Arc::new(HnswVectorIndex::in_memory(DistanceMetric::Cosine).unwrap());
    let engine = engine_with(index, Arc::new(EchoLlm::new("ok")));

    let report = engine.load_from_file(&path, None).await.unwrap();
    assert!(report.success());
    assert_eq!(report.documents_indexed, 1);

    std::fs::write(&path, "[]").unwrap();
    let empty = engine.load_from_file(&path, None).await.unwrap();
    assert!(!empty.success());
}
