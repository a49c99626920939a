//! Index manifest: what the stored vectors are compatible with

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_VERSION: u32 = 1;
pub const DISTANCE_METRIC: &str = "cosine";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimension: usize,
    pub distance: String,
    pub entry_count: usize,
    /// Entries file name, relative to the index directory
    pub entries_file: String,
    /// Hex SHA-256 of the entries file
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    /// Read `manifest.json` from an index directory
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = std::fs::read(&path).map_err(|e| AppError::IndexNotFound {
            path: dir.display().to_string(),
            reason: format!("{} unreadable: {}", MANIFEST_FILE, e),
        })?;

        serde_json::from_slice(&bytes).map_err(|e| AppError::IndexNotFound {
            path: dir.display().to_string(),
            reason: format!("index is corrupt: {} does not parse: {}", MANIFEST_FILE, e),
        })
    }

    /// Fail fast when the stored vectors cannot be compared with vectors
    /// from the configured embedder
    pub fn check_compatible(&self, model: &str, dimension: usize) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(AppError::IndexIncompatible {
                expected: format!("format version {}", FORMAT_VERSION),
                found: format!("format version {}", self.format_version),
            });
        }
        if self.distance != DISTANCE_METRIC {
            return Err(AppError::IndexIncompatible {
                expected: format!("{} distance", DISTANCE_METRIC),
                found: format!("{} distance", self.distance),
            });
        }
        if self.dimension != dimension || self.embedding_model != model {
            return Err(AppError::IndexIncompatible {
                expected: format!("model {} with {} dimensions", model, dimension),
                found: format!(
                    "model {} with {} dimensions",
                    self.embedding_model, self.dimension
                ),
            });
        }
        Ok(())
    }
}
