//! PDF text extraction module
//!
//! Produces one `Page` per PDF page using lopdf. Pages whose text cannot be
//! decoded by lopdf fall back to a scan of the raw content stream.

use async_trait::async_trait;
use hrdesk_common::models::{Document, Page};
use std::path::Path;
use tracing::{debug, warn};

/// Turns a source file into a `Document`. Errors are plain messages; the
/// processor attaches path and progress.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Document, String>;
}

/// Loads PDFs with lopdf
#[derive(Debug, Default, Clone)]
pub struct PdfLoader;

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(&self, path: &Path) -> Result<Document, String> {
        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extract_pages(&owned))
            .await
            .map_err(|e| format!("extraction task failed: {}", e))??;

        let document = Document::new(path, pages);
        if document.is_blank() {
            return Err("no text content extracted from PDF".to_string());
        }
        Ok(document)
    }
}

/// Extract the text of every page, in page order
pub fn extract_pages(path: &Path) -> Result<Vec<Page>, String> {
    let doc = lopdf::Document::load(path).map_err(|e| format!("failed to load PDF: {}", e))?;
    if doc.is_encrypted() {
        return Err("PDF is encrypted".to_string());
    }

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), path = %path.display(), "Extracting text from PDF");

    let mut result = Vec::with_capacity(pages.len());
    for (&page_number, &page_id) in pages.iter() {
        let text = match doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                debug!(page = page_number, error = %e, "Falling back to content stream scan");
                match doc.get_page_content(page_id) {
                    Ok(content) => extract_text_from_content(&content),
                    Err(e) => {
                        warn!(page = page_number, error = %e, "Failed to read page, leaving it empty");
                        String::new()
                    }
                }
            }
        };
        result.push(Page {
            page_number,
            raw_text: clean_text(&text),
        });
    }

    Ok(result)
}

/// Extract text from a PDF content stream: text between BT and ET
fn extract_text_from_content(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;
    let mut current_text = String::new();

    for line in content_str.lines() {
        let trimmed = line.trim();

        if trimmed == "BT" {
            in_text_block = true;
            continue;
        }

        if trimmed == "ET" {
            in_text_block = false;
            if !current_text.is_empty() {
                text.push_str(&current_text);
                text.push('\n');
                current_text.clear();
            }
            continue;
        }

        if in_text_block {
            if let Some(text_content) = extract_text_from_operator(trimmed) {
                current_text.push_str(&text_content);
            }
        }
    }

    text
}

/// Text shown by a `Tj`, `'`, `"` or `TJ` operator
fn extract_text_from_operator(line: &str) -> Option<String> {
    if line.ends_with("Tj") || line.ends_with('\'') || line.ends_with('"') {
        let start = line.find('(')?;
        let end = line.rfind(')')?;
        if end > start {
            return Some(decode_pdf_string(&line[start + 1..end]));
        }
        return None;
    }

    if line.ends_with("TJ") {
        let mut result = String::new();
        let mut in_paren = false;
        let mut escaped = false;
        let mut current = String::new();

        for ch in line.chars() {
            match ch {
                _ if escaped => {
                    current.push(ch);
                    escaped = false;
                }
                '\\' if in_paren => {
                    current.push(ch);
                    escaped = true;
                }
                '(' if !in_paren => in_paren = true,
                ')' if in_paren => {
                    in_paren = false;
                    result.push_str(&decode_pdf_string(&current));
                    current.clear();
                }
                _ if in_paren => current.push(ch),
                _ => {}
            }
        }

        if !result.is_empty() {
            return Some(result);
        }
    }

    None
}

/// Decode PDF string escapes
fn decode_pdf_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some(c) => result.push(c),
                None => {}
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Strip extraction artifacts; layout whitespace is left to the chunker
fn clean_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .replace('\u{00AD}', "")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\r', "")
}
