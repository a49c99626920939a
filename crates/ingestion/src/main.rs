//! HRDesk Ingestion
//!
//! Builds the policy vector index offline:
//! 1. Lists the PDFs in the data directory
//! 2. Extracts page text and chunks it
//! 3. Embeds the chunks in batches
//! 4. Persists the index (atomically replacing any previous one)

mod chunker;
mod errors;
mod pdf;
mod processor;

use chunker::{Chunker, ChunkingConfig};
use hrdesk_common::{
    config::AppConfig, embeddings::create_embedder, metrics, telemetry::init_tracing, VERSION,
};
use pdf::PdfLoader;
use processor::IngestionProcessor;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!("Starting HRDesk ingestion v{}", VERSION);

    config.validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    metrics::register_metrics();

    let embedder = create_embedder(&config.embedding)?;
    let chunker = Chunker::new(ChunkingConfig::try_from(&config.chunking)?)?;
    info!(
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        chunk_size = config.chunking.chunk_size,
        chunk_overlap = config.chunking.chunk_overlap,
        "Ingestion configured"
    );

    let processor = IngestionProcessor::new(
        Arc::new(PdfLoader),
        chunker,
        embedder,
        config.embedding.batch_size,
        config.ingestion.skip_unreadable,
    );

    match processor
        .run(&config.paths.data_dir, &config.paths.index_dir)
        .await
    {
        Ok(report) => {
            for skipped in &report.skipped {
                info!(path = %skipped.path.display(), reason = %skipped.reason, "Skipped document");
            }
            info!(
                report = %serde_json::to_string(&report)?,
                index_dir = %config.paths.index_dir.display(),
                "Index build finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, processed = ?e.processed(), "Ingestion aborted");
            Err(e.into())
        }
    }
}
