//! Metrics and observability utilities
//!
//! Prometheus-style metrics for the query pipelines, ingestion and the
//! model backends, with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all HRDesk metrics
pub const METRICS_PREFIX: &str = "hrdesk";

/// Buckets for question latency (in seconds); generation dominates
pub const QUERY_BUCKETS: &[f64] = &[
    0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00, 120.0,
];

/// Buckets for embedding latency
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of questions answered, by kind and outcome"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Question latency in seconds"
    );

    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total policy documents ingested"
    );

    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks written to the vector index"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding backend requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_engine_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total reasoning engine requests"
    );

    describe_histogram!(
        format!("{}_engine_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Reasoning engine latency in seconds"
    );

    describe_counter!(
        format!("{}_translations_rejected_total", METRICS_PREFIX),
        Unit::Count,
        "Generated computations rejected by the sandbox"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record question metrics
pub struct QueryMetrics {
    start: Instant,
    kind: &'static str,
}

impl QueryMetrics {
    /// Start tracking a question
    pub fn start(kind: &'static str) -> Self {
        Self {
            start: Instant::now(),
            kind,
        }
    }

    /// Record completion
    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed().as_secs_f64();
        let outcome = if success { "success" } else { "error" };

        counter!(
            format!("{}_queries_total", METRICS_PREFIX),
            "kind" => self.kind,
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            format!("{}_query_duration_seconds", METRICS_PREFIX),
            "kind" => self.kind
        )
        .record(duration);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
        tracing::trace!(model, batch_size, duration_secs, "Embedding batch complete");
    }
}

/// Helper to record reasoning engine metrics
pub fn record_engine(duration_secs: f64, model: &str, outcome: &'static str) {
    counter!(
        format!("{}_engine_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        format!("{}_engine_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a sandbox rejection
pub fn record_translation_rejected(kind: &'static str) {
    counter!(
        format!("{}_translations_rejected_total", METRICS_PREFIX),
        "kind" => kind
    )
    .increment(1);
}

/// Helper to record ingestion metrics
pub fn record_ingestion(documents: usize, chunks: usize) {
    counter!(format!("{}_documents_ingested_total", METRICS_PREFIX)).increment(documents as u64);
    counter!(format!("{}_chunks_indexed_total", METRICS_PREFIX)).increment(chunks as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [QUERY_BUCKETS, EMBEDDING_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_query_metrics() {
        let metrics = QueryMetrics::start("policy");
        std::thread::sleep(std::time::Duration::from_millis(5));
        metrics.finish(true);
        // Just verify it runs without a recorder installed
    }
}
