//! Chunks and the persisted index entries built from them

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a chunk came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub path: PathBuf,
    /// Page on which the chunk starts (1-based)
    pub page: u32,
}

impl SourceMetadata {
    /// File name shown in citations
    pub fn label(&self) -> String {
        super::document::file_label(&self.path)
    }
}

/// A bounded text window cut from a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_document_id: String,
    pub source: SourceMetadata,
    pub text: String,
    /// Position of this chunk within its document
    pub sequence_index: usize,
}

/// The persisted unit of the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}
