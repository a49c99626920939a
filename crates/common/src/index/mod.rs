//! Persisted flat vector index
//!
//! Holds `(vector, chunk)` entries in insertion order and answers exact
//! nearest-neighbour queries by cosine distance. The on-disk layout is:
//!
//! ```text
//! <dir>/manifest.json          compatibility metadata + pointer to entries
//! <dir>/entries-<uuid>.jsonl   one IndexEntry per line
//! ```
//!
//! `persist` writes a fresh entries file, then swaps the manifest with a
//! rename, so a crash never leaves the directory pointing at a partial file.

mod manifest;

pub use manifest::{IndexManifest, DISTANCE_METRIC, FORMAT_VERSION, MANIFEST_FILE};

use crate::errors::{AppError, Result};
use crate::models::{Chunk, IndexEntry};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// An entry with its distance to the query vector
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub chunk: Chunk,
    /// Cosine distance, `1 - cosine similarity`
    pub distance: f32,
}

/// In-memory flat index
#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
    norms: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index for the given embedding model
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            model: model.into(),
            dimension,
            entries: Vec::new(),
            norms: Vec::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append entries. Fails without adding anything if any vector has the
    /// wrong dimension.
    pub fn add(&mut self, entries: Vec<IndexEntry>) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.dimension) {
            return Err(AppError::IndexIncompatible {
                expected: format!("{} dimensions", self.dimension),
                found: format!("{} dimensions for chunk {}", bad.vector.len(), bad.chunk.id),
            });
        }

        self.norms.extend(entries.iter().map(|e| l2_norm(&e.vector)));
        self.entries.extend(entries);
        Ok(())
    }

    /// The `k` nearest entries by ascending cosine distance.
    ///
    /// Ties keep insertion order.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        if query.len() != self.dimension {
            return Err(AppError::IndexIncompatible {
                expected: format!("{} dimensions", self.dimension),
                found: format!("query vector with {} dimensions", query.len()),
            });
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (entry, &norm))| (i, cosine_distance(query, query_norm, &entry.vector, norm)))
            .collect();

        // Stable sort keeps insertion order for equal distances
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, distance)| ScoredEntry {
                chunk: self.entries[i].chunk.clone(),
                distance,
            })
            .collect())
    }

    /// Write the index to `dir`, replacing any previous index atomically
    #[instrument(skip_all, fields(dir = %dir.display(), entries = self.entries.len()))]
    pub fn persist(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let entries_file = format!("entries-{}.jsonl", uuid::Uuid::new_v4().simple());
        let entries_path = dir.join(&entries_file);

        let mut bytes = Vec::new();
        for entry in &self.entries {
            serde_json::to_writer(&mut bytes, entry)?;
            bytes.push(b'\n');
        }
        write_synced(&entries_path, &bytes)?;

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedding_model: self.model.clone(),
            dimension: self.dimension,
            distance: DISTANCE_METRIC.to_string(),
            entry_count: self.entries.len(),
            entries_file: entries_file.clone(),
            checksum: hex::encode(Sha256::digest(&bytes)),
            created_at: chrono::Utc::now(),
        };

        let manifest_tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
        write_synced(&manifest_tmp, &serde_json::to_vec_pretty(&manifest)?)?;
        fs::rename(&manifest_tmp, dir.join(MANIFEST_FILE))?;

        remove_stale_entry_files(dir, &entries_file);

        info!(entries_file = %entries_file, "Vector index persisted");
        Ok(())
    }

    /// Load an index from `dir`, checking it was built with the expected
    /// embedding model and dimension before reading any entry
    #[instrument(skip_all, fields(dir = %dir.display(), model = expected_model))]
    pub fn load(dir: &Path, expected_model: &str, expected_dimension: usize) -> Result<Self> {
        let manifest = IndexManifest::read(dir)?;
        manifest.check_compatible(expected_model, expected_dimension)?;

        let entries_path = dir.join(&manifest.entries_file);
        let bytes = fs::read(&entries_path).map_err(|e| AppError::IndexNotFound {
            path: entries_path.display().to_string(),
            reason: format!("entries file unreadable: {}", e),
        })?;

        let corrupt = |reason: String| AppError::IndexNotFound {
            path: dir.display().to_string(),
            reason: format!("index is corrupt: {}", reason),
        };

        let checksum = hex::encode(Sha256::digest(&bytes));
        if checksum != manifest.checksum {
            return Err(corrupt("entries checksum does not match manifest".to_string()));
        }

        let mut index = Self::new(manifest.embedding_model.clone(), manifest.dimension);
        let mut entries = Vec::with_capacity(manifest.entry_count);
        for (line_no, line) in bytes.split(|b| *b == b'\n').enumerate() {
            if line.is_empty() {
                continue;
            }
            let entry: IndexEntry = serde_json::from_slice(line)
                .map_err(|e| corrupt(format!("line {}: {}", line_no + 1, e)))?;
            entries.push(entry);
        }

        if entries.len() != manifest.entry_count {
            return Err(corrupt(format!(
                "manifest lists {} entries, found {}",
                manifest.entry_count,
                entries.len()
            )));
        }

        index.add(entries).map_err(|e| corrupt(e.to_string()))?;
        info!(entries = index.len(), model = %index.model, "Vector index loaded");
        Ok(index)
    }

    /// Load the index, or start empty when none exists and bootstrapping is
    /// allowed. Corrupt or incompatible indexes always fail.
    pub fn open_or_bootstrap(
        dir: &Path,
        expected_model: &str,
        expected_dimension: usize,
        bootstrap_empty: bool,
    ) -> Result<Self> {
        if bootstrap_empty && !dir.join(MANIFEST_FILE).exists() {
            warn!(dir = %dir.display(), "No vector index found, bootstrapping an empty one");
            return Ok(Self::new(expected_model, expected_dimension));
        }
        Self::load(dir, expected_model, expected_dimension)
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine_distance(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    1.0 - dot / (a_norm * b_norm)
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

fn remove_stale_entry_files(dir: &Path, keep: &str) {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return;
    };
    for entry in read_dir.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("entries-") && name.ends_with(".jsonl") && name != keep {
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!(file = %name, "Removed stale entries file"),
                Err(e) => warn!(file = %name, error = %e, "Failed to remove stale entries file"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceMetadata;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hrdesk-index-{}-{}", name, uuid::Uuid::new_v4()))
    }

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            source_document_id: "doc".to_string(),
            source: SourceMetadata {
                path: PathBuf::from("/policies/handbook.pdf"),
                page: 1,
            },
            text: text.to_string(),
            sequence_index: 0,
        }
    }

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new("test-model", 3);
        index
            .add(vec![
                IndexEntry { vector: vec![1.0, 0.0, 0.0], chunk: chunk("a", "alpha") },
                IndexEntry { vector: vec![0.0, 1.0, 0.0], chunk: chunk("b", "beta") },
                IndexEntry { vector: vec![0.7, 0.7, 0.0], chunk: chunk("c", "gamma") },
                IndexEntry { vector: vec![0.0, 1.0, 0.0], chunk: chunk("d", "delta") },
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_identical_vector_ranks_first() {
        let index = sample_index();
        let hits = index.top_k(&[0.7, 0.7, 0.0], 2).unwrap();
        assert_eq!(hits[0].chunk.id, "c");
        assert!(hits[0].distance.abs() < 1e-6);
        assert!(hits[1].distance > hits[0].distance);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = sample_index();
        let hits = index.top_k(&[0.0, 2.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].chunk.id, "b");
        assert_eq!(hits[1].chunk.id, "d");
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = sample_index();
        assert_eq!(index.top_k(&[1.0, 0.0, 0.0], 10).unwrap().len(), 4);
    }

    #[test]
    fn test_add_rejects_wrong_dimension() {
        let mut index = sample_index();
        let err = index
            .add(vec![IndexEntry { vector: vec![1.0], chunk: chunk("x", "x") }])
            .unwrap_err();
        assert!(matches!(err, AppError::IndexIncompatible { .. }));
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_persist_then_load_round_trip() {
        let dir = temp_dir("roundtrip");
        let index = sample_index();
        index.persist(&dir).unwrap();

        let loaded = VectorIndex::load(&dir, "test-model", 3).unwrap();
        assert_eq!(loaded.len(), index.len());

        let query = [0.2, 0.9, 0.1];
        assert_eq!(index.top_k(&query, 3).unwrap(), loaded.top_k(&query, 3).unwrap());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_persist_replaces_previous_entries_file() {
        let dir = temp_dir("replace");
        sample_index().persist(&dir).unwrap();
        sample_index().persist(&dir).unwrap();

        let entry_files = fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("entries-"))
            .count();
        assert_eq!(entry_files, 1);
        assert!(VectorIndex::load(&dir, "test-model", 3).is_ok());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_dimension_mismatch_is_incompatible() {
        let dir = temp_dir("dims");
        let mut index = VectorIndex::new("all-minilm", 384);
        index
            .add(vec![IndexEntry { vector: vec![0.1; 384], chunk: chunk("a", "alpha") }])
            .unwrap();
        index.persist(&dir).unwrap();

        let err = VectorIndex::load(&dir, "all-minilm", 768).unwrap_err();
        assert!(matches!(err, AppError::IndexIncompatible { .. }));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_model_mismatch_is_incompatible() {
        let dir = temp_dir("model");
        sample_index().persist(&dir).unwrap();
        let err = VectorIndex::load(&dir, "other-model", 3).unwrap_err();
        assert!(matches!(err, AppError::IndexIncompatible { .. }));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_index_is_not_found() {
        let dir = temp_dir("missing");
        let err = VectorIndex::load(&dir, "test-model", 3).unwrap_err();
        assert!(matches!(err, AppError::IndexNotFound { .. }));
    }

    #[test]
    fn test_tampered_entries_are_rejected() {
        let dir = temp_dir("tampered");
        sample_index().persist(&dir).unwrap();
        let manifest = IndexManifest::read(&dir).unwrap();
        fs::write(dir.join(&manifest.entries_file), b"{\"garbage\":true}\n").unwrap();

        let err = VectorIndex::load(&dir, "test-model", 3).unwrap_err();
        match err {
            AppError::IndexNotFound { reason, .. } => assert!(reason.contains("corrupt")),
            other => panic!("unexpected error: {other}"),
        }
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_bootstrap_empty_only_when_allowed() {
        let dir = temp_dir("bootstrap");
        let index = VectorIndex::open_or_bootstrap(&dir, "test-model", 3, true).unwrap();
        assert!(index.is_empty());
        assert!(VectorIndex::open_or_bootstrap(&dir, "test-model", 3, false).is_err());
    }
}
