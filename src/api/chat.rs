use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};

use crate::models::AskRequest;
use crate::state::AppState;

const IDLE_TIMEOUT_SECS: u64 = 30;

/// POST /api/chat - Streaming question/answer with SSE.
///
/// Emits a `context` event with the cited passages, `delta` events with
/// answer fragments, then `done`. Query failures before the first token
/// are sent as a single `error` event followed by `done`.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let question = req.question.trim().to_string();
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

    let (sources, llm_stream) = match state.engine.ask_stream(&question, &history).await {
        Ok(pair) => pair,
        Err(e) if e.is_query_failure() => {
            tracing::warn!("Question could not be answered: {e}");
            let error_event: Result<Event, Infallible> = Ok(Event::default()
                .event("error")
                .json_data(serde_json::json!({ "message": e.to_string() }))
                .unwrap());
            let event_stream = stream::iter(vec![error_event, done_event()]).left_stream();
            return Ok(Sse::new(event_stream));
        }
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Chat failed: {e}"),
            ))
        }
    };

    let context_event: Result<Event, Infallible> = Ok(Event::default()
        .event("context")
        .json_data(serde_json::json!({ "sources": sources }))
        .unwrap());

    let idle_timeout = Duration::from_secs(IDLE_TIMEOUT_SECS);

    let delta_stream = futures_util::stream::unfold(
        (llm_stream, idle_timeout, false),
        |(mut llm_stream, timeout, stopped)| async move {
            if stopped {
                return None;
            }
            match tokio::time::timeout(timeout, llm_stream.next()).await {
                Ok(Some(Ok(content))) => {
                    let event: Result<Event, Infallible> = Ok(Event::default()
                        .event("delta")
                        .json_data(serde_json::json!({ "content": content }))
                        .unwrap());
                    Some((event, (llm_stream, timeout, false)))
                }
                Ok(Some(Err(e))) => {
                    // Emit the error event, then stop
                    let event: Result<Event, Infallible> = Ok(Event::default()
                        .event("error")
                        .json_data(serde_json::json!({ "message": e.to_string() }))
                        .unwrap());
                    Some((event, (llm_stream, timeout, true)))
                }
                Ok(None) => None, // Stream ended naturally
                Err(_) => {
                    // Idle timeout — emit error and stop
                    let event: Result<Event, Infallible> = Ok(Event::default()
                        .event("error")
                        .json_data(
                            serde_json::json!({ "message": "Generation timed out (idle)" }),
                        )
                        .unwrap());
                    Some((event, (llm_stream, timeout, true)))
                }
            }
        },
    );

    let event_stream = stream::once(async move { context_event })
        .chain(delta_stream)
        .chain(stream::once(async move { done_event() }));

    // Hold the semaphore permit for the lifetime of the stream
    let event_stream = event_stream
        .map(move |event| {
            let _permit = &_permit;
            event
        })
        .right_stream();

    Ok(Sse::new(event_stream))
}

fn done_event() -> Result<Event, Infallible> {
    Ok(Event::default()
        .event("done")
        .json_data(serde_json::json!({}))
        .unwrap())
}
