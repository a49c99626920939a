//! Answers handed back to the caller

use super::Chunk;
use serde::{Deserialize, Serialize};

/// Excerpt of a source that was supplied as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// File name of the source document
    pub source_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub excerpt: String,
}

impl From<&Chunk> for Citation {
    fn from(chunk: &Chunk) -> Self {
        Self {
            source_label: chunk.source.label(),
            page: Some(chunk.source.page),
            excerpt: chunk.text.clone(),
        }
    }
}

/// Result of one question. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl QueryResult {
    /// An answer without citations
    pub fn answer_only(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            citations: Vec::new(),
        }
    }
}
