use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::error_status;
use crate::models::{BookFormat, BookStatus, IngestAccepted, IngestState, Page};
use crate::state::AppState;

/// POST /api/book - Upload a book (multipart `file` field) and ingest it
/// in the background. Replaces the current book wholesale on success.
pub async fn upload_book(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestAccepted>), (StatusCode, String)> {
    let mut payload: Option<(String, BookFormat, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .ok_or((StatusCode::BAD_REQUEST, "File name is required".to_string()))?
            .to_string();
        let format = BookFormat::from_filename(&filename)
            .map_err(|e| (error_status(&e), e.to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Upload failed: {e}")))?;
        payload = Some((filename, format, bytes.to_vec()));
        break;
    }

    let (filename, format, bytes) = payload.ok_or((
        StatusCode::BAD_REQUEST,
        "Multipart field 'file' is required".to_string(),
    ))?;

    if bytes.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Uploaded file is empty".to_string()));
    }
    let max_bytes = state.config.max_upload_mb as usize * 1024 * 1024;
    if bytes.len() > max_bytes {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("File exceeds the {} MB upload limit", state.config.max_upload_mb),
        ));
    }

    // One ingest at a time; a second upload during ingest is rejected, not queued
    let permit = state.ingest_semaphore.clone().try_acquire_owned().map_err(|_| {
        (
            StatusCode::CONFLICT,
            "A book is already being ingested".to_string(),
        )
    })?;

    let title = title_from_filename(&filename);

    let accepted = IngestAccepted {
        title: title.clone(),
        format,
    };

    let engine = state.engine.clone();
    tokio::spawn(async move {
        let _permit = permit;
        match engine.ingest(&bytes, format, &title).await {
            Ok(book) => tracing::info!(
                "Ingested \"{}\": {} pages, {} chunks",
                book.title,
                book.page_count,
                book.chunk_count
            ),
            Err(e) => tracing::error!("Ingest of \"{title}\" failed: {e}"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /api/book - Current book and ingest progress.
pub async fn book_status(State(state): State<AppState>) -> Json<BookStatus> {
    Json(BookStatus {
        book: state.engine.book(),
        ingest: state.engine.ingest_state(),
    })
}

/// GET /api/book/pages/{index} - Raw page text for the reading view.
pub async fn get_page(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<Page>, (StatusCode, String)> {
    if state.engine.book().is_none() {
        return Err((StatusCode::NOT_FOUND, "No book is loaded".to_string()));
    }
    state
        .engine
        .page(index)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("Page {index} is out of range")))
}

/// DELETE /api/book - Remove the current book and its index.
pub async fn delete_book(
    State(state): State<AppState>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.engine.book().is_none() && state.engine.ingest_state() == IngestState::Idle {
        return Err((StatusCode::NOT_FOUND, "No book is loaded".to_string()));
    }
    state
        .engine
        .delete_book()
        .map_err(|e| (error_status(&e), e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Derive a display title from the uploaded file name.
fn title_from_filename(filename: &str) -> String {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem = base.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(base);
    let cleaned = stem.replace(['_', '-'], " ").trim().to_string();
    if cleaned.is_empty() {
        "Untitled".to_string()
    } else {
        cleaned
    }
}
