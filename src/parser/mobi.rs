//! MOBI text extraction.
//!
//! A MOBI file is a PalmDB: a record table followed by record data. Record
//! 0 holds the PalmDoc header (compression type, text length, text record
//! count); records 1..=count hold the book text, PalmDoc-compressed or
//! plain. The decompressed text is HTML, which is stripped and split into
//! sections at paragraph boundaries since MOBI has no physical pages.

use crate::error::{RagError, Result};
use crate::models::Page;

const COMPRESSION_NONE: u16 = 1;
const COMPRESSION_PALMDOC: u16 = 2;
const COMPRESSION_HUFF_CDIC: u16 = 17480;

/// Target characters per synthesized section.
const SECTION_CHARS: usize = 3000;

pub fn parse(bytes: &[u8]) -> Result<Vec<Page>> {
    let records = record_table(bytes)?;
    let header = records
        .first()
        .ok_or_else(|| corrupt("no records"))
        .map(|r| palmdoc_header(r))??;

    if header.compression == COMPRESSION_HUFF_CDIC {
        return Err(corrupt("HUFF/CDIC compression is not supported"));
    }
    if header.compression != COMPRESSION_NONE && header.compression != COMPRESSION_PALMDOC {
        return Err(corrupt(&format!(
            "unknown compression type {}",
            header.compression
        )));
    }

    let mut raw = Vec::with_capacity(header.text_length);
    let last = (header.text_record_count as usize).min(records.len().saturating_sub(1));
    for record in &records[1..=last] {
        if header.compression == COMPRESSION_PALMDOC {
            palmdoc_decompress(record, &mut raw);
        } else {
            raw.extend_from_slice(record);
        }
    }
    raw.truncate(header.text_length);

    let html = String::from_utf8_lossy(&raw);
    let text = super::strip_html(&html);
    if text.is_empty() {
        return Err(corrupt("no text content"));
    }

    Ok(split_sections(&text, SECTION_CHARS))
}

fn corrupt(msg: &str) -> RagError {
    RagError::CorruptDocument(format!("mobi: {msg}"))
}

struct PalmDocHeader {
    compression: u16,
    text_length: usize,
    text_record_count: u16,
}

/// Parse the PalmDB record table and slice out each record's data.
fn record_table(bytes: &[u8]) -> Result<Vec<&[u8]>> {
    // Fixed PalmDB header is 78 bytes; the record count sits at offset 76.
    if bytes.len() < 78 {
        return Err(corrupt("file too short for a PalmDB header"));
    }
    let type_creator = &bytes[60..68];
    if type_creator != b"BOOKMOBI" && type_creator != b"TEXtREAd" {
        return Err(corrupt("not a MOBI/PalmDoc database"));
    }

    let num_records = u16::from_be_bytes([bytes[76], bytes[77]]) as usize;
    if num_records == 0 {
        return Err(corrupt("empty record table"));
    }
    let table_end = 78 + num_records * 8;
    if bytes.len() < table_end {
        return Err(corrupt("truncated record table"));
    }

    let mut offsets = Vec::with_capacity(num_records);
    for i in 0..num_records {
        let at = 78 + i * 8;
        let offset = u32::from_be_bytes([
            bytes[at],
            bytes[at + 1],
            bytes[at + 2],
            bytes[at + 3],
        ]) as usize;
        if offset > bytes.len() {
            return Err(corrupt("record offset past end of file"));
        }
        offsets.push(offset);
    }

    let mut records = Vec::with_capacity(num_records);
    for (i, &start) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).copied().unwrap_or(bytes.len());
        if end < start {
            return Err(corrupt("record offsets out of order"));
        }
        records.push(&bytes[start..end]);
    }
    Ok(records)
}

fn palmdoc_header(record0: &[u8]) -> Result<PalmDocHeader> {
    if record0.len() < 12 {
        return Err(corrupt("record 0 too short for a PalmDoc header"));
    }
    Ok(PalmDocHeader {
        compression: u16::from_be_bytes([record0[0], record0[1]]),
        text_length: u32::from_be_bytes([record0[4], record0[5], record0[6], record0[7]])
            as usize,
        text_record_count: u16::from_be_bytes([record0[8], record0[9]]),
    })
}

/// PalmDoc LZ77 decompression, appending to `out`.
///
/// Byte ranges: 0x01-0x08 literal runs, 0x09-0x7f literals, 0x80-0xbf
/// back-references (14-bit distance, 3-bit length+3), 0xc0-0xff a space
/// plus the byte with the high bit cleared.
fn palmdoc_decompress(data: &[u8], out: &mut Vec<u8>) {
    let mut i = 0usize;
    while i < data.len() {
        let b = data[i];
        i += 1;
        match b {
            0x00 => out.push(b),
            0x01..=0x08 => {
                let n = (b as usize).min(data.len() - i);
                out.extend_from_slice(&data[i..i + n]);
                i += n;
            }
            0x09..=0x7f => out.push(b),
            0x80..=0xbf => {
                if i >= data.len() {
                    return;
                }
                let pair = (((b as u16) << 8) | data[i] as u16) & 0x3fff;
                i += 1;
                let distance = (pair >> 3) as usize;
                let length = (pair & 0x07) as usize + 3;
                if distance == 0 || distance > out.len() {
                    return;
                }
                for _ in 0..length {
                    let byte = out[out.len() - distance];
                    out.push(byte);
                }
            }
            0xc0..=0xff => {
                out.push(b' ');
                out.push(b ^ 0x80);
            }
        }
    }
}

/// Split plain text into roughly equal sections, preferring paragraph
/// then sentence boundaries near the target size.
fn split_sections(text: &str, target: usize) -> Vec<Page> {
    let chars: Vec<char> = text.chars().collect();
    let mut pages = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let hard_end = (start + target).min(chars.len());
        let end = if hard_end < chars.len() {
            find_break(&chars[start..hard_end])
                .map(|off| start + off)
                .unwrap_or(hard_end)
        } else {
            hard_end
        };

        let section: String = chars[start..end].iter().collect();
        let section = section.trim().to_string();
        if !section.is_empty() {
            pages.push(Page {
                index: pages.len(),
                text: section,
            });
        }
        start = end;
    }

    pages
}

/// Best break offset within a window: last paragraph break, else last
/// sentence end, but never in the first third of the window.
fn find_break(window: &[char]) -> Option<usize> {
    let floor = window.len() / 3;

    let mut para = None;
    let mut sentence = None;
    for i in (floor..window.len().saturating_sub(1)).rev() {
        if para.is_none() && window[i] == '\n' && window[i + 1] == '\n' {
            para = Some(i + 2);
            break;
        }
        if sentence.is_none()
            && matches!(window[i], '.' | '!' | '?')
            && window[i + 1].is_whitespace()
        {
            sentence = Some(i + 2);
        }
    }
    para.or(sentence)
}
