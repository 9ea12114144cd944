//! Scraped documents and the chunks cut from them

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Content category assigned by the crawler
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Category {
    #[default]
    General,
    Faq,
    Legal,
    Product,
    About,
    Pricing,
    Security,
    /// Any tag the crawler emits that this crate does not know about
    Other(String),
}

impl From<String> for Category {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

impl Category {
    /// Tag as stored in metadata and the document registry
    pub fn as_str(&self) -> &str {
        match self {
            Self::General => "general",
            Self::Faq => "faq",
            Self::Legal => "legal",
            Self::Product => "product",
            Self::About => "about",
            Self::Pricing => "pricing",
            Self::Security => "security",
            Self::Other(tag) => tag.as_str(),
        }
    }

    /// Parse a stored tag
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "general" | "" => Self::General,
            "faq" => Self::Faq,
            "legal" => Self::Legal,
            "product" => Self::Product,
            "about" => Self::About,
            "pricing" => Self::Pricing,
            "security" => Self::Security,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A single scraped page, as produced by the crawler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Page URL (unique key)
    pub url: String,
    /// Page title
    #[serde(default = "default_title")]
    pub title: String,
    /// Extracted page text
    #[serde(default)]
    pub content: String,
    /// Content category
    #[serde(default)]
    pub category: Category,
    /// Extracted keywords
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Hash of the content for deduplication
    #[serde(default)]
    pub content_hash: String,
    /// Content length in characters
    #[serde(default)]
    pub length: usize,
    /// Content word count
    #[serde(default)]
    pub word_count: usize,
    /// When the page was scraped
    #[serde(default = "chrono::Utc::now", deserialize_with = "deserialize_timestamp")]
    pub scraped_at: DateTime<Utc>,
}

fn default_title() -> String {
    "Untitled".to_string()
}

/// Accept RFC 3339 timestamps as well as naive ISO timestamps (taken as UTC)
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

impl Document {
    /// Create a document from a URL, title and content, deriving hash and counts
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            url: url.into(),
            title: title.into(),
            category: Category::General,
            keywords: Vec::new(),
            content_hash: compute_content_hash(&content),
            length: content.chars().count(),
            word_count: content.split_whitespace().count(),
            scraped_at: Utc::now(),
            content,
        }
    }

    /// Set the category
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Set the keywords
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Content hash, computing one when the crawler left it empty
    pub fn hash_or_compute(&self) -> String {
        if self.content_hash.is_empty() {
            compute_content_hash(&self.content)
        } else {
            self.content_hash.clone()
        }
    }
}

/// SHA-256 of the content, hex encoded
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Metadata a chunk inherits from its document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Source page URL
    pub source_url: String,
    /// Source page title
    pub title: String,
    /// Source page category tag
    pub category: String,
    /// Index of this chunk within its document
    pub chunk_index: usize,
    /// Number of chunks cut from the document
    pub total_chunks: usize,
    /// Comma-joined document keywords
    pub keywords: String,
    /// Index of the owning document in the build input
    pub doc_index: usize,
}

impl ChunkMetadata {
    /// Flatten into the key/value map stored alongside vectors
    pub fn to_map(&self) -> HashMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }

    /// Rebuild from a stored key/value map, tolerating missing keys
    pub fn from_map(map: &HashMap<String, serde_json::Value>) -> Self {
        let text = |key: &str| {
            map.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let number = |key: &str| map.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as usize;

        let title = text("title");
        Self {
            source_url: text("source_url"),
            title: if title.is_empty() { "Unknown".to_string() } else { title },
            category: text("category"),
            chunk_index: number("chunk_index"),
            total_chunks: number("total_chunks"),
            keywords: text("keywords"),
            doc_index: number("doc_index"),
        }
    }
}

/// A bounded slice of a document's content, the retrieval unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Deterministic id, `doc_<i>_chunk_<j>`
    pub id: String,
    /// Chunk text
    pub content: String,
    /// Inherited document metadata
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Build the deterministic id for chunk `chunk_index` of document `doc_index`
    pub fn make_id(doc_index: usize, chunk_index: usize) -> String {
        format!("doc_{}_chunk_{}", doc_index, chunk_index)
    }

    /// Create the chunks of one document from its already split texts
    pub fn from_document(doc_index: usize, doc: &Document, texts: Vec<String>) -> Vec<Self> {
        let total_chunks = texts.len();
        let keywords = doc.keywords.join(",");

        texts
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| Self {
                id: Self::make_id(doc_index, chunk_index),
                content,
                metadata: ChunkMetadata {
                    source_url: doc.url.clone(),
                    title: doc.title.clone(),
                    category: doc.category.as_str().to_string(),
                    chunk_index,
                    total_chunks,
                    keywords: keywords.clone(),
                    doc_index,
                },
            })
            .collect()
    }
}
