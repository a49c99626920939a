//! Source documents as produced by a document loader

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// One page of extracted text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number
    pub page_number: u32,
    pub raw_text: String,
}

/// A loaded source document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_path: PathBuf,
    pub pages: Vec<Page>,
}

impl Document {
    /// Build a document whose id is derived from its path
    pub fn new(source_path: impl Into<PathBuf>, pages: Vec<Page>) -> Self {
        let source_path = source_path.into();
        let id = stable_id(&[&source_path.to_string_lossy()]);
        Self {
            id,
            source_path,
            pages,
        }
    }

    /// Convenience constructor for single-page text documents
    pub fn from_text(source_path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self::new(
            source_path,
            vec![Page {
                page_number: 1,
                raw_text: text.into(),
            }],
        )
    }

    /// File name used when citing this document
    pub fn label(&self) -> String {
        file_label(&self.source_path)
    }

    /// True when no page carries any visible text
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.raw_text.trim().is_empty())
    }
}

/// File name of a path, falling back to the full path
pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Deterministic 16-hex-character identifier for the given parts
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..8])
}
