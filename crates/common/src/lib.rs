//! HRDesk Common Library
//!
//! Shared code for the HRDesk binaries including:
//! - Document, chunk and query result models
//! - Embedding and reasoning engine abstractions
//! - The persisted vector index
//! - Policy question answering (retrieval + synthesis)
//! - Tabular question answering (translation + sandboxed execution)
//! - Error types, configuration and metrics

pub mod assistant;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod tabular;
pub mod telemetry;

// Re-export commonly used types
pub use assistant::Assistant;
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use index::VectorIndex;
pub use llm::ReasoningEngine;
pub use models::{Chunk, Citation, Document, IndexEntry, QueryResult};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Default reasoning model
pub const DEFAULT_REASONING_MODEL: &str = "llama3";
