use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::error_status;
use crate::models::{AskRequest, AskResponse};
use crate::state::AppState;

/// POST /api/ask - Blocking question/answer over the loaded book.
///
/// Query failures (no book, backend down, timeout) come back as a normal
/// 200 response with an apologetic answer and the error attached, so the
/// chat session survives a dead backend.
pub async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, String)> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question is required".to_string()));
    }

    let _permit = state
        .chat_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Chat service at capacity".to_string(),
            )
        })?;

    let history = req.history.unwrap_or_default();
    match state.engine.ask(question, &history).await {
        Ok(answer) => Ok(Json(AskResponse {
            answer: answer.text,
            sources: answer.sources,
            error: None,
        })),
        Err(e) if e.is_query_failure() => {
            tracing::warn!("Question could not be answered: {e}");
            Ok(Json(AskResponse {
                answer: format!("I can't answer that right now: {e}."),
                sources: Vec::new(),
                error: Some(e.to_string()),
            }))
        }
        Err(e) => Err((error_status(&e), e.to_string())),
    }
}
