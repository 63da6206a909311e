//! RAG orchestrator: composes parser, chunker, embedder, vector index and
//! generation client into the two session operations, `ingest` and `ask`.
//!
//! The engine owns the session state explicitly — current book, parsed
//! pages and index contents live here, not in process-wide globals — so a
//! second independent session is just a second engine.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::chunker::chunk_pages;
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::index::{IndexEntry, ScoredChunk, VectorIndex};
use crate::llm::{sanitize_for_prompt, Embedder, GenerationStream, Generator};
use crate::models::{Book, BookFormat, ChatMessage, CitedPassage, IngestState, Page};
use crate::parser::parse_book;

const MAX_QUESTION_LEN: usize = 2000;

/// System prompt for book-grounded answers. Written to keep the model
/// inside the retrieved passages, which doubles as spoiler protection:
/// the model may know how the book ends, but the context does not.
const SYSTEM_PROMPT: &str = "\
You are a helpful book discussion assistant. Your role is to help the reader \
understand and discuss the book they are reading.

IMPORTANT RULES:
1. ONLY use information from the provided context passages below. Do not use \
your general knowledge about the book.
2. If the context doesn't contain enough information to answer the question, \
say so clearly.
3. NEVER reveal plot points, character fates, or events that are NOT in the \
provided context. This prevents spoilers.
4. When discussing characters, only mention what is known from the provided \
passages.
5. Be engaging and help the reader explore themes, characters, and ideas from \
the text.
6. If asked about something not in the context, politely explain that you can \
only discuss what's in the current reading.

CONTEXT FROM THE BOOK:
";

/// A complete answer with the passages it was grounded in.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<CitedPassage>,
}

/// Book state persisted across restarts alongside the vector snapshot.
#[derive(Serialize, Deserialize)]
struct PersistedBook {
    book: Book,
    pages: Vec<Page>,
}

struct CurrentBook {
    book: Book,
    pages: Arc<Vec<Page>>,
}

pub struct RagEngine {
    config: Config,
    book: RwLock<Option<CurrentBook>>,
    ingest_state: RwLock<IngestState>,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    book_path: PathBuf,
}

impl RagEngine {
    /// Open an engine over the configured data directory, reloading a
    /// previously ingested book when its persisted state and vector
    /// snapshot agree.
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let index = VectorIndex::open_or_create(&config.index_dir())?;
        let book_path = config.book_path();

        let mut book = None;
        if book_path.exists() {
            let data = std::fs::read_to_string(&book_path)?;
            if let Ok(persisted) = serde_json::from_str::<PersistedBook>(&data) {
                if index.book_id() == Some(persisted.book.id) {
                    tracing::info!(
                        "Reloaded \"{}\" ({} pages, {} chunks)",
                        persisted.book.title,
                        persisted.book.page_count,
                        persisted.book.chunk_count
                    );
                    book = Some(CurrentBook {
                        book: persisted.book,
                        pages: Arc::new(persisted.pages),
                    });
                }
            }
        }
        if book.is_none() && index.entry_count() > 0 {
            // Orphaned snapshot without matching book state
            index.clear()?;
        }

        Ok(Self {
            config,
            book: RwLock::new(book),
            ingest_state: RwLock::new(IngestState::Idle),
            index,
            embedder,
            generator,
            book_path,
        })
    }

    // ─── Ingest (write path) ─────────────────────────────

    /// Parse → chunk → embed → swap the index. On any failure the previous
    /// book and its index entries remain untouched and queryable.
    pub async fn ingest(&self, bytes: &[u8], format: BookFormat, title: &str) -> Result<Book> {
        let result = self.ingest_inner(bytes, format, title).await;
        *self.ingest_state.write() = match &result {
            Ok(_) => IngestState::Idle,
            Err(e) => IngestState::Error(e.to_string()),
        };
        result
    }

    async fn ingest_inner(&self, bytes: &[u8], format: BookFormat, title: &str) -> Result<Book> {
        let book_id = Uuid::new_v4();

        *self.ingest_state.write() = IngestState::Parsing;
        let pages = parse_book(bytes, format)?;
        tracing::info!("Parsed \"{title}\" ({format}): {} pages", pages.len());

        *self.ingest_state.write() = IngestState::Chunking;
        let chunks = chunk_pages(
            book_id,
            &pages,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )?;
        if chunks.is_empty() {
            return Err(RagError::CorruptDocument(
                "document produced no chunks".to_string(),
            ));
        }
        tracing::info!("Created {} chunks for \"{title}\"", chunks.len());

        *self.ingest_state.write() = IngestState::Embedding;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "got {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        if let Some(first) = embeddings.first() {
            if first.len() != self.config.llm.embedding_dim {
                tracing::warn!(
                    "Embedding dimension {} differs from configured {}",
                    first.len(),
                    self.config.llm.embedding_dim
                );
            }
        }

        let book = Book {
            id: book_id,
            title: title.to_string(),
            format,
            uploaded_at: chrono::Utc::now(),
            page_count: pages.len(),
            chunk_count: chunks.len(),
        };

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
            .collect();

        // Commit: swap index and book state under the book lock so a
        // concurrent ask sees a consistent pair.
        {
            let mut current = self.book.write();
            self.index.replace_book(book_id, entries)?;
            self.persist_book(&book, &pages)?;
            *current = Some(CurrentBook {
                book: book.clone(),
                pages: Arc::new(pages),
            });
        }

        tracing::info!("\"{title}\" is ready for questions");
        Ok(book)
    }

    fn persist_book(&self, book: &Book, pages: &[Page]) -> Result<()> {
        let data = serde_json::to_string(&PersistedBook {
            book: book.clone(),
            pages: pages.to_vec(),
        })?;
        let tmp_path = self.book_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, &self.book_path)?;
        Ok(())
    }

    /// Discard the current book and its index entries.
    pub fn delete_book(&self) -> Result<()> {
        let mut current = self.book.write();
        self.index.clear()?;
        if self.book_path.exists() {
            std::fs::remove_file(&self.book_path)?;
        }
        *current = None;
        *self.ingest_state.write() = IngestState::Idle;
        Ok(())
    }

    // ─── Ask (read path) ─────────────────────────────────

    /// Answer a question from the loaded book: embed the question,
    /// retrieve the top-k passages, assemble the prompt, call the model.
    pub async fn ask(&self, question: &str, history: &[ChatMessage]) -> Result<Answer> {
        let (sources, messages) = self.retrieve(question, history).await?;
        let text = self.generator.generate(messages).await?;
        Ok(Answer { text, sources })
    }

    /// Streaming variant: same retrieval, deltas instead of a full answer.
    pub async fn ask_stream(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<(Vec<CitedPassage>, GenerationStream)> {
        let (sources, messages) = self.retrieve(question, history).await?;
        let stream = self.generator.generate_stream(messages).await?;
        Ok((sources, stream))
    }

    /// Shared front half of `ask`: retrieval plus prompt assembly.
    /// Fails with `NoDocumentLoaded` before any backend call.
    async fn retrieve(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<(Vec<CitedPassage>, Vec<ChatMessage>)> {
        if self.book.read().is_none() {
            return Err(RagError::NoDocumentLoaded);
        }

        let question = sanitize_for_prompt(&truncate_to_char_boundary(
            question.trim(),
            MAX_QUESTION_LEN,
        ));
        let history = sanitize_history(history, self.config.max_history_turns);

        let query_embedding = self.embedder.embed_one(&question).await?;
        let hits = self.index.query(&query_embedding, self.config.top_k)?;

        let messages = build_messages(&hits, &history, &question);
        let sources = hits
            .into_iter()
            .map(|h| CitedPassage {
                chunk_id: h.chunk.id,
                page_index: h.chunk.page_index,
                text: h.chunk.text,
                score: h.score,
            })
            .collect();

        Ok((sources, messages))
    }

    // ─── Presentation reads ──────────────────────────────

    pub fn book(&self) -> Option<Book> {
        self.book.read().as_ref().map(|b| b.book.clone())
    }

    pub fn ingest_state(&self) -> IngestState {
        self.ingest_state.read().clone()
    }

    /// Page text for the reading view; bypasses the RAG path entirely.
    pub fn page(&self, index: usize) -> Option<Page> {
        let guard = self.book.read();
        guard
            .as_ref()
            .and_then(|b| b.pages.get(index))
            .cloned()
    }

    pub async fn available_models(&self) -> Result<Vec<String>> {
        self.generator.list_models().await
    }

    pub async fn backend_available(&self) -> bool {
        self.generator.is_available().await
    }
}

// ─── Prompt assembly ─────────────────────────────────────

/// Retrieved passages, most relevant first, in the original's
/// `[Passage n]` framing.
fn build_context_block(hits: &[ScoredChunk]) -> String {
    if hits.is_empty() {
        return "No relevant passages found in the book.\n".to_string();
    }

    let mut ctx = String::new();
    for (i, hit) in hits.iter().enumerate() {
        let text = sanitize_for_prompt(&hit.chunk.text);
        // write! to a String is infallible
        let _ = write!(
            ctx,
            "[Passage {} — page {}]\n{}\n\n",
            i + 1,
            hit.chunk.page_index + 1,
            text
        );
    }
    ctx
}

fn build_messages(
    hits: &[ScoredChunk],
    history: &[ChatMessage],
    question: &str,
) -> Vec<ChatMessage> {
    let mut system = String::from(SYSTEM_PROMPT);
    system.push_str(&build_context_block(hits));
    system.push_str(
        "\nRemember: stay grounded in the provided context. Do not spoil anything \
         beyond what's shown above.",
    );

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: system,
    });
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: question.to_string(),
    });
    messages
}

/// Keep only user/assistant turns, sanitized, capped to the most recent
/// `max_turns`.
fn sanitize_history(history: &[ChatMessage], max_turns: usize) -> Vec<ChatMessage> {
    let kept: Vec<ChatMessage> = history
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .map(|m| ChatMessage {
            role: m.role.clone(),
            content: sanitize_for_prompt(&truncate_to_char_boundary(
                &m.content,
                MAX_QUESTION_LEN,
            )),
        })
        .collect();

    let skip = kept.len().saturating_sub(max_turns);
    kept.into_iter().skip(skip).collect()
}

fn truncate_to_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    s.char_indices()
        .take_while(|(i, _)| *i < max_len)
        .map(|(_, c)| c)
        .collect()
}
