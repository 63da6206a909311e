//! Document parsing: raw file bytes → ordered pages of plain text.
//!
//! One parser per supported format, selected by the declared
//! [`BookFormat`]. All three produce the same shape: an ordered sequence
//! of [`Page`]s, where a "page" is a physical PDF page, an EPUB spine
//! document, or a MOBI section.

pub mod epub;
pub mod mobi;
pub mod pdf;

use crate::error::{RagError, Result};
use crate::models::{BookFormat, Page};

/// Parse raw file bytes into pages according to the declared format.
///
/// Returns `CorruptDocument` when the bytes cannot be decoded or yield no
/// extractable text at all. No side effects.
pub fn parse_book(bytes: &[u8], format: BookFormat) -> Result<Vec<Page>> {
    let pages = match format {
        BookFormat::Pdf => pdf::parse(bytes)?,
        BookFormat::Epub => epub::parse(bytes)?,
        BookFormat::Mobi => mobi::parse(bytes)?,
    };

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(RagError::CorruptDocument(
            "no extractable text found".to_string(),
        ));
    }
    Ok(pages)
}

/// Strip HTML markup and decode entities, preserving paragraph breaks.
///
/// `<p>`, `<br>`, `<div>`, headings and list items become newlines so the
/// chunker still sees paragraph structure.
pub(crate) fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        text.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        match tail.find('>') {
            Some(close) => {
                let tag = tail[..close].trim_start_matches('/');
                let name: String = tag
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase();
                if matches!(
                    name.as_str(),
                    "p" | "br" | "div" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
                        | "blockquote"
                ) {
                    text.push('\n');
                }
                // Drop the contents of non-text elements entirely
                if (name == "style" || name == "script") && !tag.starts_with('/') {
                    let closer = format!("</{name}");
                    if let Some(end) = tail[close + 1..].to_ascii_lowercase().find(&closer) {
                        rest = &tail[close + 1 + end..];
                        continue;
                    }
                }
                rest = &tail[close + 1..];
            }
            None => {
                // Unterminated tag: drop the remainder
                rest = "";
            }
        }
    }
    text.push_str(rest);

    tidy_text(&html_escape::decode_html_entities(&text))
}

/// Normalize whitespace: collapse runs of spaces/tabs, cap blank lines,
/// and trim the ends. Paragraph breaks survive as `\n\n`.
pub(crate) fn tidy_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0usize;

    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        out.push_str(&line);
    }

    out
}
