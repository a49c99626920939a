//! Ingestion error types
//!
//! Every variant that aborts a run carries the number of documents already
//! processed so the operator knows how far the build got.

use hrdesk_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("No PDF documents found in {dir}")]
    NoSourceDocuments { dir: String },

    #[error("Nothing indexed from {dir}: all {skipped} documents were skipped")]
    NothingIndexed { dir: String, skipped: usize },

    #[error("Unreadable document {path} ({processed} documents processed): {message}")]
    UnreadableDocument {
        path: String,
        message: String,
        processed: usize,
    },

    #[error("Embedding backend unavailable ({processed} documents processed): {message}")]
    EmbeddingUnavailable { message: String, processed: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Index error: {0}")]
    Index(AppError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestionError {
    /// Documents fully processed before the failure, when known
    pub fn processed(&self) -> Option<usize> {
        match self {
            IngestionError::UnreadableDocument { processed, .. }
            | IngestionError::EmbeddingUnavailable { processed, .. } => Some(*processed),
            IngestionError::NoSourceDocuments { .. } | IngestionError::NothingIndexed { .. } => {
                Some(0)
            }
            _ => None,
        }
    }
}

impl From<AppError> for IngestionError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Configuration { message } => IngestionError::Configuration(message),
            other => IngestionError::Index(other),
        }
    }
}
