pub mod ask;
pub mod book;
pub mod chat;
pub mod config;

use axum::http::StatusCode;

use crate::error::RagError;

/// Map pipeline errors to HTTP statuses for the endpoints that report
/// failures at the HTTP layer (ingest, page reads). `/api/ask` and
/// `/api/chat` handle query failures in-band instead.
pub(crate) fn error_status(e: &RagError) -> StatusCode {
    match e {
        RagError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        RagError::CorruptDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RagError::InvalidChunkParameters { .. } => StatusCode::BAD_REQUEST,
        RagError::NoDocumentLoaded => StatusCode::NOT_FOUND,
        RagError::IndexEmpty => StatusCode::CONFLICT,
        RagError::EmbeddingUnavailable(_)
        | RagError::GenerationUnreachable(_)
        | RagError::GenerationError { .. } => StatusCode::BAD_GATEWAY,
        RagError::GenerationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        RagError::Io(_) | RagError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
