use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RagError;

/// Supported book formats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Pdf,
    Epub,
    Mobi,
}

impl BookFormat {
    /// Derive the format from a file name. Anything other than the three
    /// supported extensions is rejected at the upload boundary.
    pub fn from_filename(name: &str) -> Result<Self, RagError> {
        let ext = name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Ok(BookFormat::Pdf),
            "epub" => Ok(BookFormat::Epub),
            "mobi" => Ok(BookFormat::Mobi),
            other => Err(RagError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for BookFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookFormat::Pdf => write!(f, "pdf"),
            BookFormat::Epub => write!(f, "epub"),
            BookFormat::Mobi => write!(f, "mobi"),
        }
    }
}

/// The currently loaded book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub format: BookFormat,
    pub uploaded_at: DateTime<Utc>,
    pub page_count: usize,
    pub chunk_count: usize,
}

/// A parsed page (or section, for formats without physical pages).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    pub text: String,
}

/// A contiguous span of book text, the unit of embedding and retrieval.
///
/// `id` is the ordinal of the chunk within the book and doubles as the
/// tie-breaker when two chunks score identically at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: usize,
    pub book_id: Uuid,
    /// Page containing the start of this chunk.
    pub page_index: usize,
    /// Char offsets into the concatenated book text.
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

/// Ingest progress reported by `GET /api/book`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    Idle,
    Parsing,
    Chunking,
    Embedding,
    Error(String),
}

/// A single chat turn (user or assistant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A retrieved passage cited in an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitedPassage {
    pub chunk_id: usize,
    pub page_index: usize,
    pub text: String,
    pub score: f32,
}

/// Question request, shared by `/api/ask` and `/api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub history: Option<Vec<ChatMessage>>,
}

/// Blocking answer response.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub sources: Vec<CitedPassage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /api/book` response.
#[derive(Debug, Clone, Serialize)]
pub struct BookStatus {
    pub book: Option<Book>,
    pub ingest: IngestState,
}

/// `POST /api/book` acknowledgement; ingest continues in the background.
#[derive(Debug, Clone, Serialize)]
pub struct IngestAccepted {
    pub title: String,
    pub format: BookFormat,
}

/// LLM config update request.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfigUpdate {
    // base_url intentionally omitted: immutable at runtime to prevent SSRF
    pub chat_model: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_dim: Option<usize>,
}

/// `GET /api/models` response.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub available: bool,
    pub models: Vec<String>,
}
