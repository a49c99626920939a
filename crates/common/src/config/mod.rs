//! Configuration management for HRDesk services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Embedding backend configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Reasoning engine configuration
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingSettings,

    /// Tabular query configuration
    #[serde(default)]
    pub tabular: TabularConfig,

    /// Ingestion run configuration
    #[serde(default)]
    pub ingestion: IngestionSettings,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory holding the policy PDFs
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory holding the persisted vector index
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,

    /// Employee dataset (CSV with a header row)
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: ollama, openai, hashing
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Model identifier, recorded in the index manifest
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Backend base URL
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    /// API key (openai provider only)
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Texts per embedding request during ingestion
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReasoningConfig {
    /// Reasoning provider: ollama, openai
    #[serde(default = "default_reasoning_provider")]
    pub provider: String,

    /// Model identifier
    #[serde(default = "default_reasoning_model")]
    pub model: String,

    /// Backend base URL
    #[serde(default = "default_reasoning_endpoint")]
    pub endpoint: String,

    /// API key (openai provider only)
    pub api_key: Option<String>,

    /// Sampling temperature, kept at zero for reproducible answers
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Generation timeout in seconds
    #[serde(default = "default_reasoning_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Number of chunks supplied as context
    #[serde(default = "default_k")]
    pub k: usize,

    /// Start with an empty index when none has been built yet
    #[serde(default)]
    pub bootstrap_empty: bool,
}

/// Chunk sizes are measured in characters (Unicode scalar values)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TabularConfig {
    /// Rows shown to the engine as a sample of the table
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,

    /// Wall-clock budget for executing one computation
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_ms: u64,

    /// Largest table a computation may scan
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IngestionSettings {
    /// Log and skip PDFs that cannot be read instead of aborting the run
    #[serde(default)]
    pub skip_unreadable: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (debug, info, hrdesk_common=debug, ...)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Default value functions
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_index_dir() -> PathBuf { PathBuf::from("data/index") }
fn default_dataset() -> PathBuf { PathBuf::from("data/employees.csv") }
fn default_embedding_provider() -> String { "ollama".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_endpoint() -> String { "http://localhost:11434".to_string() }
fn default_embedding_timeout() -> u64 { 30 }
fn default_batch_size() -> usize { 16 }
fn default_reasoning_provider() -> String { "ollama".to_string() }
fn default_reasoning_model() -> String { crate::DEFAULT_REASONING_MODEL.to_string() }
fn default_reasoning_endpoint() -> String { "http://localhost:11434".to_string() }
fn default_max_tokens() -> usize { 1024 }
fn default_reasoning_timeout() -> u64 { 120 }
fn default_k() -> usize { 3 }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 100 }
fn default_sample_rows() -> usize { 5 }
fn default_execution_timeout() -> u64 { 2000 }
fn default_max_rows() -> usize { 1_000_000 }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 180 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 0 }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index_dir: default_index_dir(),
            dataset: default_dataset(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            endpoint: default_embedding_endpoint(),
            api_key: None,
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider: default_reasoning_provider(),
            model: default_reasoning_model(),
            endpoint: default_reasoning_endpoint(),
            api_key: None,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_reasoning_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            bootstrap_empty: false,
        }
    }
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            sample_rows: default_sample_rows(),
            execution_timeout_ms: default_execution_timeout(),
            max_rows: default_max_rows(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__K=5
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipelines cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.chunk_size == 0 {
            return Err(ConfigError::Message("chunking.chunk_size must be positive".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::Message(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.k == 0 {
            return Err(ConfigError::Message("retrieval.k must be at least 1".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Message("embedding.dimension must be positive".into()));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get tabular execution timeout as Duration
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.tabular.execution_timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            embedding: EmbeddingConfig::default(),
            reasoning: ReasoningConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunking: ChunkingSettings::default(),
            tabular: TabularConfig::default(),
            ingestion: IngestionSettings::default(),
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.k, 3);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.reasoning.temperature, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut config = AppConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_k_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.k = 0;
        assert!(config.validate().is_err());
    }
}
