//! Domain models shared by ingestion and query time

mod chunk;
mod document;
mod query;

pub use chunk::{Chunk, IndexEntry, SourceMetadata};
pub use document::{stable_id, Document, Page};
pub use query::{Citation, QueryResult};
