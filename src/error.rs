use thiserror::Error;

/// Errors produced by the ingest and query pipelines.
///
/// Ingest-path errors (`UnsupportedFormat` through `EmbeddingUnavailable`)
/// abort the whole ingest and leave the previous book untouched. Query-path
/// errors (`NoDocumentLoaded`, `IndexEmpty`, the `Generation*` family) are
/// turned into a single user-facing chat message by the API layer so the
/// session stays usable.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("unsupported format: {0} (expected pdf, epub, or mobi)")]
    UnsupportedFormat(String),

    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    #[error("invalid chunk parameters: overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidChunkParameters { chunk_size: usize, overlap: usize },

    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("the vector index is empty")]
    IndexEmpty,

    #[error("no book is loaded")]
    NoDocumentLoaded,

    #[error("generation endpoint unreachable: {0}")]
    GenerationUnreachable(String),

    #[error("generation timed out after {0}s")]
    GenerationTimeout(u64),

    #[error("generation endpoint returned {status}: {body}")]
    GenerationError { status: u16, body: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Persistence(#[from] serde_json::Error),
}

impl RagError {
    /// True for failures that should be surfaced as a chat message instead
    /// of an HTTP error, because they can occur on any ordinary question.
    pub fn is_query_failure(&self) -> bool {
        matches!(
            self,
            RagError::NoDocumentLoaded
                | RagError::IndexEmpty
                | RagError::EmbeddingUnavailable(_)
                | RagError::GenerationUnreachable(_)
                | RagError::GenerationTimeout(_)
                | RagError::GenerationError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_failures_classified() {
        assert!(RagError::NoDocumentLoaded.is_query_failure());
        assert!(RagError::IndexEmpty.is_query_failure());
        assert!(RagError::GenerationTimeout(120).is_query_failure());
        assert!(!RagError::UnsupportedFormat("docx".into()).is_query_failure());
        assert!(!RagError::InvalidChunkParameters {
            chunk_size: 100,
            overlap: 100
        }
        .is_query_failure());
    }
}
