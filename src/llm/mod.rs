//! Clients for the local LLM backend (Ollama), behind trait seams so the
//! pipeline is testable without a running model.

pub mod chat;
pub mod embeddings;

pub use chat::OllamaChat;
pub use embeddings::OllamaEmbedder;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream::Stream;

use crate::error::Result;
use crate::models::ChatMessage;

/// Stream of answer text deltas.
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Maps text to fixed-dimension vectors, deterministically per model
/// version. The production implementation is [`embeddings::OllamaEmbedder`].
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        if vectors.is_empty() {
            return Err(crate::error::RagError::EmbeddingUnavailable(
                "backend returned no embedding".to_string(),
            ));
        }
        Ok(vectors.remove(0))
    }
}

/// Sends an assembled prompt to the generation endpoint. The production
/// implementation is [`chat::OllamaChat`].
#[async_trait]
pub trait Generator: Send + Sync {
    /// Blocking completion: returns the full answer text.
    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String>;

    /// Streaming completion: yields answer deltas as they arrive.
    async fn generate_stream(&self, messages: Vec<ChatMessage>) -> Result<GenerationStream>;

    /// Model names the backend currently serves.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Quick reachability probe.
    async fn is_available(&self) -> bool;
}

/// Strip special chat-template tokens from user-supplied text before it
/// is interpolated into a prompt, so a passage or question cannot smuggle
/// in a fake system turn.
pub fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|im_start|>", "")
        .replace("<|im_end|>", "")
        .replace("<|system|>", "")
        .replace("<|user|>", "")
        .replace("<|assistant|>", "")
        .replace("<|endoftext|>", "")
}
