//! Ingestion processor
//!
//! Core logic for building the policy index: load each PDF, chunk it, embed
//! the chunks in batches and persist the resulting vector index.

use crate::chunker::Chunker;
use crate::errors::IngestionError;
use crate::pdf::DocumentLoader;
use hrdesk_common::embeddings::Embedder;
use hrdesk_common::index::VectorIndex;
use hrdesk_common::metrics;
use hrdesk_common::models::{Chunk, IndexEntry};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// A source that was skipped instead of aborting the run
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub documents_processed: usize,
    pub chunks_indexed: usize,
    pub skipped: Vec<SkippedDocument>,
}

/// Ingestion processor
pub struct IngestionProcessor {
    loader: Arc<dyn DocumentLoader>,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    skip_unreadable: bool,
}

impl IngestionProcessor {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        skip_unreadable: bool,
    ) -> Self {
        Self {
            loader,
            chunker,
            embedder,
            batch_size: batch_size.max(1),
            skip_unreadable,
        }
    }

    /// PDF files in `dir` (extension matched case-insensitively), sorted by
    /// file name so runs are reproducible
    pub fn list_sources(dir: &Path) -> Result<Vec<PathBuf>, IngestionError> {
        let read_dir = std::fs::read_dir(dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IngestionError::NoSourceDocuments {
                dir: dir.display().to_string(),
            },
            _ => IngestionError::Io(e),
        })?;

        let mut sources = Vec::new();
        for entry in read_dir {
            let path = entry?.path();
            let is_pdf = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if is_pdf && path.is_file() {
                sources.push(path);
            }
        }
        sources.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        if sources.is_empty() {
            return Err(IngestionError::NoSourceDocuments {
                dir: dir.display().to_string(),
            });
        }
        Ok(sources)
    }

    /// Build the index from `data_dir` and persist it to `index_dir`.
    ///
    /// On failure the live index is left untouched. Documents processed
    /// before the failure are persisted to `<index_dir>.partial`.
    #[instrument(skip_all, fields(data_dir = %data_dir.display(), index_dir = %index_dir.display()))]
    pub async fn run(&self, data_dir: &Path, index_dir: &Path) -> Result<IngestionReport, IngestionError> {
        let mut index = VectorIndex::new(self.embedder.model_name(), self.embedder.dimension());

        match self.build_index(data_dir, &mut index).await {
            Ok(report) => {
                index.persist(index_dir)?;
                metrics::record_ingestion(report.documents_processed, report.chunks_indexed);
                info!(
                    documents = report.documents_processed,
                    chunks = report.chunks_indexed,
                    skipped = report.skipped.len(),
                    "Ingestion complete"
                );
                Ok(report)
            }
            Err(e) => {
                if !index.is_empty() {
                    let partial = partial_dir(index_dir);
                    match index.persist(&partial) {
                        Ok(()) => warn!(
                            path = %partial.display(),
                            entries = index.len(),
                            "Partial progress saved"
                        ),
                        Err(persist_error) => error!(
                            error = %persist_error,
                            "Failed to save partial progress"
                        ),
                    }
                }
                Err(e)
            }
        }
    }

    /// Load, chunk and embed every source, appending to `index`. Each
    /// document is added only once all of its chunks are embedded. A run in
    /// which every source was skipped fails so the live index is kept.
    pub async fn build_index(
        &self,
        data_dir: &Path,
        index: &mut VectorIndex,
    ) -> Result<IngestionReport, IngestionError> {
        let sources = Self::list_sources(data_dir)?;
        info!(count = sources.len(), "Found policy documents");

        let mut report = IngestionReport::default();

        for path in sources {
            let document = match self.loader.load(&path).await {
                Ok(document) => document,
                Err(message) if self.skip_unreadable => {
                    warn!(path = %path.display(), error = %message, "Skipping unreadable document");
                    report.skipped.push(SkippedDocument { path, reason: message });
                    continue;
                }
                Err(message) => {
                    return Err(IngestionError::UnreadableDocument {
                        path: path.display().to_string(),
                        message,
                        processed: report.documents_processed,
                    });
                }
            };

            let chunks = self.chunker.split(&document);
            if chunks.is_empty() {
                warn!(path = %path.display(), "Document produced no chunks");
                report.skipped.push(SkippedDocument {
                    path,
                    reason: "no text to index".to_string(),
                });
                continue;
            }

            let chunk_count = chunks.len();
            let entries = self.embed_chunks(chunks).await.map_err(|message| {
                IngestionError::EmbeddingUnavailable {
                    message,
                    processed: report.documents_processed,
                }
            })?;
            index.add(entries)?;

            report.documents_processed += 1;
            report.chunks_indexed += chunk_count;
            info!(
                document = %document.label(),
                pages = document.pages.len(),
                chunks = chunk_count,
                "Document indexed"
            );
        }

        if report.documents_processed == 0 {
            return Err(IngestionError::NothingIndexed {
                dir: data_dir.display().to_string(),
                skipped: report.skipped.len(),
            });
        }

        Ok(report)
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexEntry>, String> {
        let mut entries = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| e.to_string())?;

            if vectors.len() != batch.len() {
                return Err(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                ));
            }

            entries.extend(
                vectors
                    .into_iter()
                    .zip(batch.iter().cloned())
                    .map(|(vector, chunk)| IndexEntry { vector, chunk }),
            );
        }

        Ok(entries)
    }
}

/// Sibling directory holding the progress of an aborted run
pub fn partial_dir(index_dir: &Path) -> PathBuf {
    let mut name = index_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index".into());
    name.push(".partial");
    index_dir.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkingConfig;
    use async_trait::async_trait;
    use hrdesk_common::embeddings::HashingEmbedder;
    use hrdesk_common::errors::{AppError, Result as AppResult};
    use hrdesk_common::index::MANIFEST_FILE;
    use hrdesk_common::models::Document;

    /// Reads files as plain text; files starting with `%BROKEN` fail
    struct TextLoader;

    #[async_trait]
    impl DocumentLoader for TextLoader {
        async fn load(&self, path: &Path) -> std::result::Result<Document, String> {
            let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
            if text.starts_with("%BROKEN") {
                return Err("xref table is damaged".to_string());
            }
            Ok(Document::from_text(path, text))
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> AppResult<Vec<f32>> {
            Err(AppError::EmbeddingUnavailable {
                message: "connection refused".to_string(),
            })
        }

        async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            Err(AppError::EmbeddingUnavailable {
                message: "connection refused".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "down"
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    fn workspace(files: &[(&str, &str)]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("hrdesk-ingest-{}", uuid::Uuid::new_v4()));
        let data = root.join("policies");
        std::fs::create_dir_all(&data).unwrap();
        for (name, content) in files {
            std::fs::write(data.join(name), content).unwrap();
        }
        root
    }

    fn processor(embedder: Arc<dyn Embedder>, skip_unreadable: bool) -> IngestionProcessor {
        IngestionProcessor::new(
            Arc::new(TextLoader),
            Chunker::new(ChunkingConfig {
                chunk_size: 80,
                chunk_overlap: 10,
            })
            .unwrap(),
            embedder,
            2,
            skip_unreadable,
        )
    }

    const REMOTE: &str = "Employees may work remotely up to 3 days per week. Managers approve schedules.";
    const LEAVE: &str = "Annual leave is 25 days. Unused leave carries over for three months only.";

    #[test]
    fn test_list_sources_filters_and_sorts() {
        let root = workspace(&[("b.pdf", REMOTE), ("A.PDF", LEAVE), ("notes.txt", "x")]);
        let sources = IngestionProcessor::list_sources(&root.join("policies")).unwrap();
        let names: Vec<String> = sources
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.PDF", "b.pdf"]);
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_empty_directory_has_no_sources() {
        let root = workspace(&[("readme.md", "nothing here")]);
        let err = IngestionProcessor::list_sources(&root.join("policies")).unwrap_err();
        assert!(matches!(err, IngestionError::NoSourceDocuments { .. }));
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_run_persists_loadable_index() {
        let root = workspace(&[("remote_policy.pdf", REMOTE), ("leave.pdf", LEAVE)]);
        let embedder = Arc::new(HashingEmbedder::new(64));
        let index_dir = root.join("index");

        let report = processor(embedder.clone(), false)
            .run(&root.join("policies"), &index_dir)
            .await
            .unwrap();
        assert_eq!(report.documents_processed, 2);
        assert!(report.chunks_indexed >= 2);

        let index = VectorIndex::load(&index_dir, embedder.model_name(), 64).unwrap();
        assert_eq!(index.len(), report.chunks_indexed);
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_unreadable_document_aborts_and_saves_partial() {
        let root = workspace(&[
            ("a_leave.pdf", LEAVE),
            ("b_broken.pdf", "%BROKEN"),
            ("c_remote.pdf", REMOTE),
        ]);
        let index_dir = root.join("index");

        let err = processor(Arc::new(HashingEmbedder::new(64)), false)
            .run(&root.join("policies"), &index_dir)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestionError::UnreadableDocument { processed: 1, .. }
        ));
        assert!(!index_dir.join(MANIFEST_FILE).exists());
        assert!(partial_dir(&index_dir).join(MANIFEST_FILE).exists());
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_missing_data_dir_has_no_sources() {
        let dir = std::env::temp_dir().join(format!("hrdesk-missing-{}", uuid::Uuid::new_v4()));
        let err = IngestionProcessor::list_sources(&dir).unwrap_err();
        assert!(matches!(err, IngestionError::NoSourceDocuments { .. }));
    }

    #[tokio::test]
    async fn test_all_skipped_keeps_live_index() {
        let root = workspace(&[("remote_policy.pdf", REMOTE)]);
        let index_dir = root.join("index");
        let embedder = Arc::new(HashingEmbedder::new(64));
        processor(embedder.clone(), true)
            .run(&root.join("policies"), &index_dir)
            .await
            .unwrap();
        let before = VectorIndex::load(&index_dir, embedder.model_name(), 64).unwrap().len();

        let broken = workspace(&[("broken.pdf", "%BROKEN")]);
        let err = processor(embedder.clone(), true)
            .run(&broken.join("policies"), &index_dir)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestionError::NothingIndexed { skipped: 1, .. }));
        let after = VectorIndex::load(&index_dir, embedder.model_name(), 64).unwrap().len();
        assert_eq!(after, before);
        assert!(before > 0);
        assert!(!partial_dir(&index_dir).exists());

        std::fs::remove_dir_all(root).ok();
        std::fs::remove_dir_all(broken).ok();
    }

    #[tokio::test]
    async fn test_skip_unreadable_continues() {
        let root = workspace(&[("a_broken.pdf", "%BROKEN"), ("b_remote.pdf", REMOTE)]);

        let report = processor(Arc::new(HashingEmbedder::new(64)), true)
            .run(&root.join("policies"), &root.join("index"))
            .await
            .unwrap();
        assert_eq!(report.documents_processed, 1);
        assert_eq!(report.skipped.len(), 1);
        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn test_embedding_failure_reports_progress() {
        let root = workspace(&[("remote_policy.pdf", REMOTE)]);
        let err = processor(Arc::new(DownEmbedder), false)
            .run(&root.join("policies"), &root.join("index"))
            .await
            .unwrap_err();
        assert_eq!(err.processed(), Some(0));
        assert!(matches!(err, IngestionError::EmbeddingUnavailable { .. }));
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_partial_dir_is_sibling() {
        assert_eq!(
            partial_dir(Path::new("data/index")),
            PathBuf::from("data/index.partial")
        );
    }
}
