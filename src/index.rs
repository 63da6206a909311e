//! In-memory vector index with cosine similarity and disk persistence.
//!
//! The index holds a single immutable snapshot behind an `Arc`. Ingesting
//! a book builds a complete new snapshot and swaps the pointer in one
//! step, so a query racing a re-ingest sees either the old book's entries
//! or the new book's, never a mixture. The snapshot is persisted as JSON
//! under the data directory and reloaded on startup.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::Chunk;

/// A stored vector entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// One book's worth of entries; replaced wholesale on ingest.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    book_id: Option<Uuid>,
    entries: Vec<IndexEntry>,
}

/// A query hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

pub struct VectorIndex {
    snapshot: RwLock<Arc<Snapshot>>,
    persist_path: PathBuf,
}

impl VectorIndex {
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;
        let persist_path = index_dir.join("vectors.json");

        let snapshot = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            Snapshot::default()
        };

        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            persist_path,
        })
    }

    /// Replace the entire index contents with one book's entries.
    ///
    /// The new snapshot is persisted before the swap; on any failure the
    /// previous snapshot stays visible to queries.
    pub fn replace_book(&self, book_id: Uuid, entries: Vec<IndexEntry>) -> Result<()> {
        let next = Arc::new(Snapshot {
            book_id: Some(book_id),
            entries,
        });

        self.persist(&next)?;
        *self.snapshot.write() = next;
        Ok(())
    }

    /// Drop all entries (book deletion).
    pub fn clear(&self) -> Result<()> {
        let next = Arc::new(Snapshot::default());
        self.persist(&next)?;
        *self.snapshot.write() = next;
        Ok(())
    }

    /// Top-k entries by cosine similarity, descending; ties broken by
    /// ascending chunk id. Returns fewer than `k` only when fewer entries
    /// exist, and `IndexEmpty` when there are none.
    pub fn query(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let snapshot = self.snapshot.read().clone();
        if snapshot.entries.is_empty() {
            return Err(RagError::IndexEmpty);
        }

        let mut scored: Vec<(f32, &IndexEntry)> = snapshot
            .entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.chunk.id.cmp(&b.1.chunk.id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| ScoredChunk {
                chunk: e.chunk.clone(),
                score,
            })
            .collect())
    }

    /// Book id the current snapshot belongs to, if any.
    pub fn book_id(&self) -> Option<Uuid> {
        self.snapshot.read().book_id
    }

    pub fn entry_count(&self) -> usize {
        self.snapshot.read().entries.len()
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let data = serde_json::to_string(snapshot)?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, &self.persist_path)?;
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
