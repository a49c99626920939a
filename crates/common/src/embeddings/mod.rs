//! Embedding service abstraction
//!
//! Provides a unified interface for the embedding backends:
//! - Ollama (all-minilm, nomic-embed-text, ...)
//! - OpenAI-compatible endpoints
//! - A deterministic feature-hashing embedder for offline runs and tests
//!
//! Documents and queries go through the same `Embedder` so their vectors
//! are comparable.

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

fn unavailable(message: impl Into<String>) -> AppError {
    AppError::EmbeddingUnavailable {
        message: message.into(),
    }
}

fn check_dimension(vector: &[f32], expected: usize, model: &str) -> Result<()> {
    if vector.len() != expected {
        return Err(unavailable(format!(
            "model {} returned {} dimensions, expected {}",
            model,
            vector.len(),
            expected
        )));
    }
    Ok(())
}

/// Ollama embedding client
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dimension: usize,
    base_url: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn make_request(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| unavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("API error {}: {}", status, body)));
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("Failed to parse response: {}", e)))?;

        check_dimension(&result.embedding, self.dimension, &self.model)?;
        Ok(result.embedding)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let result = self.make_request(text).await;
        metrics::record_embedding(start.elapsed().as_secs_f64(), &self.model, 1, result.is_ok());
        result
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // The endpoint takes one prompt per call
        let start = Instant::now();
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            match self.make_request(text).await {
                Ok(embedding) => embeddings.push(embedding),
                Err(e) => {
                    metrics::record_embedding(
                        start.elapsed().as_secs_f64(),
                        &self.model,
                        texts.len(),
                        false,
                    );
                    return Err(e);
                }
            }
        }
        metrics::record_embedding(start.elapsed().as_secs_f64(), &self.model, texts.len(), true);
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// OpenAI-compatible embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "embedding.api_key is required for the openai provider".to_string(),
        })?;

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&OpenAIRequest {
                input: texts,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| unavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("API error {}: {}", status, body)));
        }

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(unavailable(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                result.data.len()
            )));
        }

        let embeddings: Vec<Vec<f32>> = result.data.into_iter().map(|e| e.embedding).collect();
        for embedding in &embeddings {
            check_dimension(embedding, self.dimension, &self.model)?;
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| unavailable("Empty response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // OpenAI has a limit of 2048 texts per request
        const BATCH_SIZE: usize = 100;

        let start = Instant::now();
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            match self.make_request(chunk).await {
                Ok(embeddings) => all_embeddings.extend(embeddings),
                Err(e) => {
                    metrics::record_embedding(
                        start.elapsed().as_secs_f64(),
                        &self.model,
                        texts.len(),
                        false,
                    );
                    return Err(e);
                }
            }
        }

        metrics::record_embedding(start.elapsed().as_secs_f64(), &self.model, texts.len(), true);
        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic bag-of-words embedder.
///
/// Lower-cased alphanumeric tokens are hashed into `dimension` signed
/// buckets and the result is L2-normalised. Texts sharing vocabulary end
/// up close under cosine distance.
pub struct HashingEmbedder {
    model: String,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: format!("hashing-{}", dimension),
            dimension,
        }
    }

    /// Name the embedder after a configured model. The identifier recorded
    /// in the index manifest is `hashing:<model>`, so an index built this way
    /// never loads under a real backend serving `<model>`.
    pub fn with_model(model: impl AsRef<str>, dimension: usize) -> Self {
        Self {
            model: format!("hashing:{}", model.as_ref()),
            dimension,
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "hashing" => Ok(Arc::new(HashingEmbedder::with_model(
            &config.model,
            config.dimension,
        ))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorIndex;

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Remote work policy").await.unwrap();
        let b = embedder.embed("remote WORK policy").await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_normalised() {
        let embedder = HashingEmbedder::new(128);
        let v = embedder.embed("health insurance benefits").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hashing_batch_matches_single() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed("two").await.unwrap());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "telepathy".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_embedder(&config),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_hashing_index_does_not_load_under_another_provider() {
        let hashing = create_embedder(&EmbeddingConfig {
            provider: "hashing".to_string(),
            ..EmbeddingConfig::default()
        })
        .unwrap();
        let ollama = OllamaEmbedder::new(&EmbeddingConfig::default()).unwrap();
        assert_eq!(hashing.model_name(), "hashing:all-minilm");

        let dir = std::env::temp_dir().join(format!("hrdesk-provider-{}", uuid::Uuid::new_v4()));
        VectorIndex::new(hashing.model_name(), hashing.dimension())
            .persist(&dir)
            .unwrap();

        let err = VectorIndex::load(&dir, ollama.model_name(), ollama.dimension()).unwrap_err();
        assert!(matches!(err, AppError::IndexIncompatible { .. }));
        assert!(VectorIndex::load(&dir, hashing.model_name(), hashing.dimension()).is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unreachable_ollama_is_unavailable() {
        let config = EmbeddingConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..EmbeddingConfig::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, AppError::EmbeddingUnavailable { .. }));
    }
}
