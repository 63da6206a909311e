//! EPUB text extraction, one page per spine document.
//!
//! An EPUB is a zip archive: `META-INF/container.xml` points at the OPF
//! package file, whose manifest/spine give the reading order of the XHTML
//! documents. Falls back to alphabetical XHTML entries for archives with a
//! broken package file.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;
use zip::ZipArchive;

use crate::error::{RagError, Result};
use crate::models::Page;

pub fn parse(bytes: &[u8]) -> Result<Vec<Page>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| RagError::CorruptDocument(format!("epub: {e}")))?;

    let docs = match spine_documents(&mut archive) {
        Ok(docs) if !docs.is_empty() => docs,
        Ok(_) | Err(_) => {
            warn!("EPUB package file unusable, falling back to archive order");
            fallback_documents(&mut archive)
        }
    };

    if docs.is_empty() {
        return Err(RagError::CorruptDocument(
            "epub: no content documents".to_string(),
        ));
    }

    let mut pages = Vec::with_capacity(docs.len());
    for name in &docs {
        let html = match read_entry(&mut archive, name) {
            Ok(html) => html,
            Err(e) => {
                warn!("EPUB entry {name} unreadable: {e}");
                continue;
            }
        };
        pages.push(Page {
            index: pages.len(),
            text: super::strip_html(&html),
        });
    }

    Ok(pages)
}

/// Resolve the spine: container.xml → OPF path → manifest hrefs in
/// spine order, joined against the OPF directory.
fn spine_documents(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<Vec<String>> {
    let container = read_entry(archive, "META-INF/container.xml")?;
    let opf_path = rootfile_path(&container)
        .ok_or_else(|| RagError::CorruptDocument("epub: no rootfile".to_string()))?;
    let opf = read_entry(archive, &opf_path)?;
    let (manifest, spine) = parse_opf(&opf)?;

    let base = match opf_path.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/"),
        None => String::new(),
    };

    Ok(spine
        .iter()
        .filter_map(|idref| manifest.get(idref))
        .map(|href| format!("{base}{href}"))
        .collect())
}

/// Extract the `full-path` attribute of the first `<rootfile>` element.
fn rootfile_path(container_xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(container_xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"rootfile" {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"full-path" {
                            return attr.unescape_value().ok().map(|v| v.into_owned());
                        }
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Parse the OPF package: manifest id→href map and spine idref order.
fn parse_opf(opf_xml: &str) -> Result<(HashMap<String, String>, Vec<String>)> {
    let mut manifest: HashMap<String, String> = HashMap::new();
    let mut spine: Vec<String> = Vec::new();

    let mut reader = Reader::from_str(opf_xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"item" => {
                    let mut id = None;
                    let mut href = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"id" => id = attr.unescape_value().ok().map(|v| v.into_owned()),
                            b"href" => href = attr.unescape_value().ok().map(|v| v.into_owned()),
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(href)) = (id, href) {
                        manifest.insert(id, href);
                    }
                }
                b"itemref" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"idref" {
                            if let Ok(v) = attr.unescape_value() {
                                spine.push(v.into_owned());
                            }
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(RagError::CorruptDocument(format!("epub package: {e}")));
            }
            _ => {}
        }
    }

    Ok((manifest, spine))
}

/// Archive-order XHTML entries, used when the package file is unusable.
fn fallback_documents(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter(|n| {
            let lower = n.to_ascii_lowercase();
            lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
        })
        .collect();
    names.sort();
    names
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| RagError::CorruptDocument(format!("epub entry {name}: {e}")))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| RagError::CorruptDocument(format!("epub entry {name}: {e}")))?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rootfile_path() {
        let xml = r#"<?xml version="1.0"?>
            <container xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
              <rootfiles>
                <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
              </rootfiles>
            </container>"#;
        assert_eq!(rootfile_path(xml).unwrap(), "OEBPS/content.opf");
    }

    #[test]
    fn test_rootfile_path_missing() {
        assert!(rootfile_path("<container/>").is_none());
    }

    #[test]
    fn test_parse_opf_manifest_and_spine() {
        let xml = r#"<package xmlns="http://www.idpf.org/2007/opf">
              <manifest>
                <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
                <item id="ch2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
                <item id="css" href="style.css" media-type="text/css"/>
              </manifest>
              <spine>
                <itemref idref="ch2"/>
                <itemref idref="ch1"/>
              </spine>
            </package>"#;
        let (manifest, spine) = parse_opf(xml).unwrap();
        assert_eq!(manifest.len(), 3);
        // Spine order wins, not manifest order
        assert_eq!(spine, vec!["ch2", "ch1"]);
        assert_eq!(manifest["ch2"], "ch2.xhtml");
    }

    #[test]
    fn test_parse_rejects_non_zip() {
        let err = parse(b"definitely not a zip archive").unwrap_err();
        assert!(matches!(err, RagError::CorruptDocument(_)));
    }
}
