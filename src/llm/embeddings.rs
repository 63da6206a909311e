//! Embedding generation via the Ollama `/api/embed` endpoint.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use crate::llm::Embedder;

/// Maximum characters to send per text to the embedding API.
/// nomic-embed-text has an 8 192-token context; prose tokenises at roughly
/// 4 chars per token, so 3 000 chars stays safely under the limit. We also
/// pass `truncate: true`, but Ollama has been seen returning 400 for
/// inputs past the context length regardless.
const MAX_EMBED_CHARS: usize = 3_000;

/// Texts per request; Ollama batches on the `/api/embed` endpoint.
const BATCH_SIZE: usize = 32;

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8
/// char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
    /// Ask Ollama to silently truncate inputs that exceed the model's
    /// context length instead of returning a 400 error.
    truncate: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama-backed [`Embedder`]. The config is shared with the API layer so
/// model changes apply without rebuilding the client.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    config: Arc<RwLock<LlmConfig>>,
}

impl OllamaEmbedder {
    pub fn new(client: reqwest::Client, config: Arc<RwLock<LlmConfig>>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let (url, model) = {
            let config = self.config.read();
            (format!("{}/api/embed", config.base_url), config.embedding_model.clone())
        };

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            let req = EmbedRequest {
                model: model.clone(),
                input: batch
                    .iter()
                    .map(|t| truncate_for_embedding(t).to_string())
                    .collect(),
                truncate: true,
            };

            let resp = self
                .client
                .post(&url)
                .json(&req)
                .send()
                .await
                .map_err(|e| RagError::EmbeddingUnavailable(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(RagError::EmbeddingUnavailable(format!(
                    "embed API returned {status}: {body}"
                )));
            }

            let body: EmbedResponse = resp
                .json()
                .await
                .map_err(|e| RagError::EmbeddingUnavailable(format!("bad embed response: {e}")))?;

            if body.embeddings.len() != batch.len() {
                return Err(RagError::EmbeddingUnavailable(format!(
                    "embed API returned {} vectors for {} inputs",
                    body.embeddings.len(),
                    batch.len()
                )));
            }
            all_embeddings.extend(body.embeddings);
        }

        Ok(all_embeddings)
    }
}
