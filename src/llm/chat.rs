//! Answer generation via the Ollama `/api/chat` endpoint, plus the
//! `/api/tags` model listing used for health checks.

use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use crate::llm::{GenerationStream, Generator};
use crate::models::ChatMessage;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    message: ResponseMessage,
    done: bool,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

/// Ollama-backed [`Generator`].
pub struct OllamaChat {
    client: reqwest::Client,
    config: Arc<RwLock<LlmConfig>>,
}

impl OllamaChat {
    pub fn new(client: reqwest::Client, config: Arc<RwLock<LlmConfig>>) -> Self {
        Self { client, config }
    }

    fn request_params(&self) -> (String, String, u64) {
        let config = self.config.read();
        (
            config.base_url.clone(),
            config.chat_model.clone(),
            config.generation_timeout_secs,
        )
    }

    fn map_send_error(e: reqwest::Error, timeout_secs: u64) -> RagError {
        if e.is_timeout() {
            RagError::GenerationTimeout(timeout_secs)
        } else {
            RagError::GenerationUnreachable(e.to_string())
        }
    }
}

#[async_trait]
impl Generator for OllamaChat {
    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let (base_url, model, timeout_secs) = self.request_params();
        let req = ChatRequest {
            model,
            messages,
            stream: false,
        };

        let resp = self
            .client
            .post(format!("{base_url}/api/chat"))
            .timeout(Duration::from_secs(timeout_secs))
            .json(&req)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, timeout_secs))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RagError::GenerationError { status, body });
        }

        let body: ChatResponse = resp.json().await.map_err(|e| RagError::GenerationError {
            status: 200,
            body: format!("unparseable chat response: {e}"),
        })?;

        Ok(body.message.content)
    }

    async fn generate_stream(&self, messages: Vec<ChatMessage>) -> Result<GenerationStream> {
        let (base_url, model, timeout_secs) = self.request_params();
        let req = ChatRequest {
            model,
            messages,
            stream: true,
        };

        let resp = self
            .client
            .post(format!("{base_url}/api/chat"))
            // A streamed answer can legitimately outlast the non-streaming
            // budget; idle timeouts are enforced by the SSE layer instead.
            .timeout(Duration::from_secs(timeout_secs * 4))
            .json(&req)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, timeout_secs))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RagError::GenerationError { status, body });
        }

        let stream = stream_lines(resp.bytes_stream()).filter_map(|line_result| async move {
            match line_result {
                Ok(line) => parse_chat_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let base_url = self.config.read().base_url.clone();
        let resp = self
            .client
            .get(format!("{base_url}/api/tags"))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| RagError::GenerationUnreachable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RagError::GenerationError { status, body });
        }

        let body: TagsResponse = resp.json().await.map_err(|e| RagError::GenerationError {
            status: 200,
            body: format!("unparseable tags response: {e}"),
        })?;
        Ok(body.models.into_iter().map(|m| m.name).collect())
    }

    async fn is_available(&self) -> bool {
        let base_url = self.config.read().base_url.clone();
        self.client
            .get(format!("{base_url}/api/tags"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Parse a single NDJSON chat-stream line. Returns:
/// - Some(Ok(content)) for content deltas
/// - Some(Err(e)) for parse errors
/// - None to skip (empty content or done signal)
fn parse_chat_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(line) {
        Ok(chunk) => {
            if chunk.done {
                return None;
            }
            let content = chunk.message.content;
            if content.is_empty() {
                return None;
            }
            Some(Ok(content))
        }
        Err(e) => Some(Err(RagError::GenerationError {
            status: 200,
            body: format!("unparseable stream chunk: {e}"),
        })),
    }
}

/// Convert a byte stream into a stream of complete lines.
///
/// Buffers raw bytes and splits on `b'\n'` before decoding, so a
/// multi-byte UTF-8 character arriving split across two network chunks
/// is reassembled instead of turning into replacement characters.
fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), Vec::<u8>::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                // First, try to extract a complete line from the buffer
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
                    let line = String::from_utf8_lossy(&line_bytes[..newline_pos]).into_owned();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                // Buffer has no complete line — read more bytes
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(RagError::GenerationUnreachable(format!(
                                "stream read error: {e}"
                            ))),
                            (stream, buffer),
                        ));
                    }
                    None => {
                        // Stream ended — emit remaining buffer if non-empty
                        let remaining = String::from_utf8_lossy(&buffer).into_owned();
                        buffer.clear();
                        if !remaining.trim().is_empty() {
                            return Some((Ok(remaining), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}
