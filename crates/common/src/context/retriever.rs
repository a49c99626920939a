//! Semantic retrieval over the vector index

use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::index::VectorIndex;
use crate::models::Chunk;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A chunk with its distance to the question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Embeds questions and looks up their nearest chunks
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    default_k: usize,
}

impl Retriever {
    /// Create a retriever. The embedder must be the one the index was built
    /// with, otherwise distances are meaningless.
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>, default_k: usize) -> Result<Self> {
        if embedder.model_name() != index.model() || embedder.dimension() != index.dimension() {
            return Err(AppError::IndexIncompatible {
                expected: format!(
                    "model {} with {} dimensions",
                    embedder.model_name(),
                    embedder.dimension()
                ),
                found: format!(
                    "model {} with {} dimensions",
                    index.model(),
                    index.dimension()
                ),
            });
        }

        Ok(Self {
            embedder,
            index,
            default_k: default_k.max(1),
        })
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// The `k` chunks nearest to the question, most relevant first
    #[instrument(skip(self), fields(index_size = self.index.len()))]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let embedding = self.embedder.embed(query).await?;
        let hits = self.index.top_k(&embedding, k)?;

        debug!(
            hits = hits.len(),
            best_distance = hits.first().map(|h| h.distance),
            "Retrieved policy chunks"
        );

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                chunk: hit.chunk,
                distance: hit.distance,
            })
            .collect())
    }
}
