//! SQLite database for the conversation log, user feedback and document registry

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{Document, FeedbackKind};

/// Collaborator the orchestrator logs answered questions to
#[async_trait]
pub trait ConversationLog: Send + Sync {
    /// Record one exchange and return its id
    async fn log_conversation(
        &self,
        session_id: &str,
        question: &str,
        response: &str,
        source_urls: &[String],
        relevance_score: f32,
        response_time: f64,
    ) -> Result<i64>;

    /// Record feedback on a logged exchange
    async fn log_feedback(
        &self,
        conversation_id: i64,
        kind: FeedbackKind,
        text: Option<&str>,
    ) -> Result<()>;
}

/// One logged exchange, as returned by history queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationEntry {
    /// Row id
    pub id: i64,
    /// The user's question
    pub question: String,
    /// The answer given
    pub response: String,
    /// URLs of the attributed sources
    pub sources: Vec<String>,
    /// When the exchange was logged
    pub timestamp: DateTime<Utc>,
}

/// Aggregate usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Analytics {
    /// Logged exchanges
    pub total_conversations: usize,
    /// Documents in the registry
    pub total_content: usize,
    /// Mean relevance score, 2 decimals
    pub avg_relevance: f64,
    /// Mean response time in seconds, 3 decimals
    pub avg_response_time: f64,
}

/// SQLite-based conversation log
pub struct ConversationDb {
    conn: Arc<Mutex<Connection>>,
}

impl ConversationDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::database(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
        "#).map_err(|e| Error::database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(r#"
            -- Registry of indexed pages
            CREATE TABLE IF NOT EXISTS scraped_content (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                title TEXT,
                content_hash TEXT UNIQUE,
                category TEXT DEFAULT 'general',
                keywords TEXT,
                content_length INTEGER,
                word_count INTEGER,
                scraped_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT,
                user_question TEXT NOT NULL,
                ai_response TEXT NOT NULL,
                sources_used TEXT,
                relevance_score REAL DEFAULT 0.0,
                response_time REAL DEFAULT 0.0,
                timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_session ON conversations(session_id);

            CREATE TABLE IF NOT EXISTS user_feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER,
                feedback_type TEXT CHECK(feedback_type IN ('thumbs_up', 'thumbs_down')),
                feedback_text TEXT,
                timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (conversation_id) REFERENCES conversations (id)
            );
        "#)
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Conversation database migrations complete");
        Ok(())
    }

    // ==================== Document Registry ====================

    /// Insert or replace the registry rows of the given documents
    ///
    /// Returns how many rows were written; a failing row is logged and skipped.
    pub fn save_documents(&self, documents: &[Document]) -> Result<usize> {
        let conn = self.conn.lock();
        let mut saved = 0;

        for doc in documents {
            let keywords = serde_json::to_string(&doc.keywords)?;
            let written = conn.execute(
                r#"
                INSERT OR REPLACE INTO scraped_content
                    (url, title, content_hash, category, keywords, content_length, word_count, scraped_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    doc.url,
                    doc.title,
                    doc.hash_or_compute(),
                    doc.category.as_str(),
                    keywords,
                    doc.length as i64,
                    doc.word_count as i64,
                    doc.scraped_at.to_rfc3339(),
                ],
            );

            match written {
                Ok(_) => saved += 1,
                Err(e) => tracing::warn!("Failed to save document {}: {}", doc.url, e),
            }
        }

        tracing::info!("Saved {}/{} documents to registry", saved, documents.len());
        Ok(saved)
    }

    /// Number of documents in the registry
    pub fn document_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scraped_content", [], |row| row.get(0))
            .map_err(|e| Error::database(format!("Failed to count documents: {}", e)))?;
        Ok(count as usize)
    }

    // ==================== Conversation Log ====================

    /// Insert a conversation row
    pub fn insert_conversation(
        &self,
        session_id: &str,
        question: &str,
        response: &str,
        source_urls: &[String],
        relevance_score: f32,
        response_time: f64,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        let sources = serde_json::to_string(source_urls)?;

        conn.execute(
            r#"
            INSERT INTO conversations
                (session_id, user_question, ai_response, sources_used, relevance_score, response_time, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                session_id,
                question,
                response,
                sources,
                relevance_score as f64,
                response_time,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::database(format!("Failed to log conversation: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Insert a feedback row
    pub fn insert_feedback(
        &self,
        conversation_id: i64,
        kind: FeedbackKind,
        text: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();

        let exists = conn
            .query_row(
                "SELECT id FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| Error::database(format!("Failed to look up conversation: {}", e)))?;
        if exists.is_none() {
            return Err(Error::InvalidInput(format!(
                "No conversation with id {}",
                conversation_id
            )));
        }

        conn.execute(
            r#"
            INSERT INTO user_feedback (conversation_id, feedback_type, feedback_text, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![conversation_id, kind.as_str(), text, Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::database(format!("Failed to log feedback: {}", e)))?;

        Ok(())
    }

    /// Last `limit` exchanges of a session, oldest first
    pub fn conversation_history(&self, session_id: &str, limit: usize) -> Result<Vec<ConversationEntry>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_question, ai_response, sources_used, timestamp
            FROM conversations
            WHERE session_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        ).map_err(|e| Error::database(format!("Failed to prepare query: {}", e)))?;

        let mut entries: Vec<ConversationEntry> = stmt
            .query_map(params![session_id, limit as i64], |row| {
                let sources: Option<String> = row.get(3)?;
                let timestamp: String = row.get(4)?;
                Ok(ConversationEntry {
                    id: row.get(0)?,
                    question: row.get(1)?,
                    response: row.get(2)?,
                    sources: sources
                        .and_then(|s| serde_json::from_str(&s).ok())
                        .unwrap_or_default(),
                    timestamp: parse_timestamp(&timestamp),
                })
            })
            .map_err(|e| Error::database(format!("Failed to read history: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        entries.reverse();
        Ok(entries)
    }

    /// Usage statistics over the whole log
    pub fn analytics(&self) -> Result<Analytics> {
        let conn = self.conn.lock();

        let (total_conversations, avg_relevance, avg_response_time): (i64, Option<f64>, Option<f64>) = conn
            .query_row(
                "SELECT COUNT(*), AVG(relevance_score), AVG(response_time) FROM conversations",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|e| Error::database(format!("Failed to compute analytics: {}", e)))?;

        let total_content: i64 = conn
            .query_row("SELECT COUNT(*) FROM scraped_content", [], |row| row.get(0))
            .map_err(|e| Error::database(format!("Failed to count documents: {}", e)))?;

        Ok(Analytics {
            total_conversations: total_conversations as usize,
            total_content: total_content as usize,
            avg_relevance: round_to(avg_relevance.unwrap_or(0.0), 2),
            avg_response_time: round_to(avg_response_time.unwrap_or(0.0), 3),
        })
    }

    /// Whether the database answers queries
    pub fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

#[async_trait]
impl ConversationLog for ConversationDb {
    async fn log_conversation(
        &self,
        session_id: &str,
        question: &str,
        response: &str,
        source_urls: &[String],
        relevance_score: f32,
        response_time: f64,
    ) -> Result<i64> {
        let db = self.clone_handle();
        let (session_id, question, response) =
            (session_id.to_string(), question.to_string(), response.to_string());
        let source_urls = source_urls.to_vec();

        tokio::task::spawn_blocking(move || {
            db.insert_conversation(
                &session_id,
                &question,
                &response,
                &source_urls,
                relevance_score,
                response_time,
            )
        })
        .await
        .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    async fn log_feedback(
        &self,
        conversation_id: i64,
        kind: FeedbackKind,
        text: Option<&str>,
    ) -> Result<()> {
        let db = self.clone_handle();
        let text = text.map(str::to_string);

        tokio::task::spawn_blocking(move || db.insert_feedback(conversation_id, kind, text.as_deref()))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }
}

impl ConversationDb {
    /// Another handle to the same connection
    fn clone_handle(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|n| n.and_utc()))
        .unwrap_or_else(|_| Utc::now())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
