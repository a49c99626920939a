//! Text chunking module
//!
//! Splits documents into bounded, overlapping windows for embedding.
//!
//! Sizes are counted in characters (Unicode scalar values). A window is cut
//! at the coarsest boundary available in its second half: paragraph break,
//! then sentence end, then whitespace, then a hard cut. The next window
//! starts `chunk_overlap` characters before the cut, so neighbouring chunks
//! share exactly that many characters.

use crate::errors::IngestionError;
use hrdesk_common::config::ChunkingSettings;
use hrdesk_common::models::{stable_id, Chunk, Document, SourceMetadata};
use tracing::debug;

const PAGE_BREAK: &str = "\n\n";

/// Configuration for text chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl TryFrom<&ChunkingSettings> for ChunkingConfig {
    type Error = IngestionError;

    fn try_from(settings: &ChunkingSettings) -> Result<Self, Self::Error> {
        let config = Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestionError> {
        if self.chunk_size == 0 {
            return Err(IngestionError::Configuration(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestionError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestionError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Split a document into chunks. Pages are normalised and joined with a
    /// paragraph break; each chunk is attributed to the page it starts on.
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let mut text = String::new();
        // (char offset where the page starts, page number)
        let mut page_starts: Vec<(usize, u32)> = Vec::new();
        let mut offset = 0;

        for page in &document.pages {
            let normalised = normalize_page(&page.raw_text);
            if normalised.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push_str(PAGE_BREAK);
                offset += PAGE_BREAK.len();
            }
            page_starts.push((offset, page.page_number));
            offset += normalised.chars().count();
            text.push_str(&normalised);
        }

        let chars: Vec<char> = text.chars().collect();
        let windows = self.windows(&chars);

        let chunks: Vec<Chunk> = windows
            .into_iter()
            .enumerate()
            .map(|(sequence_index, (start, end))| {
                let page = page_starts
                    .iter()
                    .take_while(|(page_start, _)| *page_start <= start)
                    .last()
                    .map(|(_, number)| *number)
                    .unwrap_or(1);

                Chunk {
                    id: stable_id(&[&document.id, &sequence_index.to_string()]),
                    source_document_id: document.id.clone(),
                    source: SourceMetadata {
                        path: document.source_path.clone(),
                        page,
                    },
                    text: chars[start..end].iter().collect(),
                    sequence_index,
                }
            })
            .collect();

        debug!(
            document = %document.label(),
            input_chars = chars.len(),
            chunk_count = chunks.len(),
            chunk_size = self.config.chunk_size,
            "Document chunked"
        );

        chunks
    }

    /// Character ranges `[start, end)` of each window
    fn windows(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let max = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let n = chars.len();

        let mut windows = Vec::new();
        let mut start = 0;

        while start < n {
            if n - start <= max {
                windows.push((start, n));
                break;
            }

            let end = start + max;
            let earliest = (start + max / 2).max(start + overlap + 1);
            let cut = find_cut(chars, earliest, end).unwrap_or(end);

            windows.push((start, cut));
            start = cut - overlap;
        }

        windows
    }
}

/// Latest cut in `[earliest, end]`, trying separators coarsest first.
/// A cut at `p` means the chunk ends just before `chars[p]`.
fn find_cut(chars: &[char], earliest: usize, end: usize) -> Option<usize> {
    let latest = |accept: &dyn Fn(usize) -> bool| (earliest..=end).rev().find(|&p| accept(p));

    let paragraph = |p: usize| p >= 2 && chars[p - 1] == '\n' && chars[p - 2] == '\n';
    let sentence = |p: usize| {
        p >= 2 && chars[p - 1].is_whitespace() && matches!(chars[p - 2], '.' | '!' | '?')
    };
    let word = |p: usize| p >= 1 && chars[p - 1].is_whitespace();

    latest(&paragraph)
        .or_else(|| latest(&sentence))
        .or_else(|| latest(&word))
}

/// Collapse runs of spaces and tabs, trim line ends and keep at most one
/// blank line between paragraphs
fn normalize_page(text: &str) -> String {
    let mut out = String::new();
    let mut pending_blank = false;

    for line in text.lines() {
        let collapsed = collapse_spaces(line);
        let line = collapsed.trim_end();

        if line.trim_start().is_empty() {
            pending_blank = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_blank { "\n\n" } else { "\n" });
        }
        pending_blank = false;
        out.push_str(line);
    }

    out
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut previous_space = false;
    for ch in line.chars() {
        if ch == ' ' || ch == '\t' {
            if !previous_space {
                out.push(' ');
            }
            previous_space = true;
        } else {
            out.push(ch);
            previous_space = false;
        }
    }
    out
}
