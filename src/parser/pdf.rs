//! PDF text extraction, one page per PDF page.

use lopdf::Document;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::models::Page;

pub fn parse(bytes: &[u8]) -> Result<Vec<Page>> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| RagError::CorruptDocument(format!("pdf: {e}")))?;

    let page_map = doc.get_pages();
    if page_map.is_empty() {
        return Err(RagError::CorruptDocument("pdf: no pages".to_string()));
    }

    let mut pages = Vec::with_capacity(page_map.len());
    for (index, (&page_num, _)) in page_map.iter().enumerate() {
        // Pages that fail extraction (scanned images, exotic encodings)
        // become empty rather than failing the whole document.
        let text = match doc.extract_text(&[page_num]) {
            Ok(t) => t,
            Err(e) => {
                debug!("PDF page {page_num}: text extraction failed: {e}");
                String::new()
            }
        };
        pages.push(Page {
            index,
            text: super::tidy_text(&text),
        });
    }

    Ok(pages)
}
