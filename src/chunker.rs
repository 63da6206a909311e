//! Fixed-size overlapping chunking of parsed book text.
//!
//! Pages are concatenated (with a paragraph break between them, the way
//! the text reads) and a sliding window of `chunk_size` characters steps
//! through at `chunk_size - overlap`, so the last `overlap` characters of
//! each chunk reappear at the start of the next. Context that straddles a
//! page boundary therefore lands in at least one intact chunk. Each chunk
//! records the page containing its first character.

use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Page};

/// Separator inserted between pages in the concatenated text.
const PAGE_SEPARATOR: &str = "\n\n";

/// Split pages into overlapping chunks. Deterministic: the same pages and
/// parameters always produce the same chunk sequence.
pub fn chunk_pages(
    book_id: Uuid,
    pages: &[Page],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(RagError::InvalidChunkParameters {
            chunk_size,
            overlap,
        });
    }

    // Concatenate pages, remembering where each page starts (in chars).
    let mut text: Vec<char> = Vec::new();
    let mut page_starts: Vec<usize> = Vec::with_capacity(pages.len());
    for page in pages {
        if !text.is_empty() {
            text.extend(PAGE_SEPARATOR.chars());
        }
        page_starts.push(text.len());
        text.extend(page.text.chars());
    }

    if text.iter().all(|c| c.is_whitespace()) {
        return Ok(Vec::new());
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(text.len());
        chunks.push(Chunk {
            id: chunks.len(),
            book_id,
            page_index: page_of(&page_starts, start),
            start_offset: start,
            end_offset: end,
            text: text[start..end].iter().collect(),
        });
        if end == text.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Index of the page whose span contains char offset `pos`.
fn page_of(page_starts: &[usize], pos: usize) -> usize {
    match page_starts.binary_search(&pos) {
        Ok(i) => i,
        Err(i) => i.saturating_sub(1),
    }
}
