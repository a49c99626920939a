//! Reasoning engine adapter
//!
//! Wraps local or remote text generation behind one trait so the answer
//! synthesizer and the tabular translator never know which backend serves
//! them:
//! - Ollama (`/api/generate`, non-streaming)
//! - OpenAI-compatible chat completion endpoints

use crate::config::ReasoningConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-call generation options
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Model identifier
    pub model: String,

    /// Sampling temperature (0.0 for reproducible output)
    pub temperature: f32,

    /// Maximum output tokens
    pub max_tokens: usize,

    /// Upper bound on the whole call
    pub timeout: Duration,

    /// Optional system prompt
    pub system_prompt: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_REASONING_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            timeout: Duration::from_secs(120),
            system_prompt: None,
        }
    }
}

impl From<&ReasoningConfig> for GenerationOptions {
    fn from(config: &ReasoningConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            system_prompt: None,
        }
    }
}

/// Text generation capability
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    /// Backend model name
    fn model_name(&self) -> &str;
}

/// Run one generation bounded by `options.timeout`.
///
/// This is the only way the pipelines call an engine: a single attempt,
/// surfaced as `EngineTimeout` when the budget runs out.
pub async fn generate_with_timeout(
    engine: &dyn ReasoningEngine,
    prompt: &str,
    options: &GenerationOptions,
) -> Result<String> {
    let start = Instant::now();
    let result = match tokio::time::timeout(options.timeout, engine.generate(prompt, options)).await
    {
        Ok(result) => result,
        Err(_) => Err(AppError::EngineTimeout {
            timeout_ms: options.timeout.as_millis() as u64,
        }),
    };

    let outcome = match &result {
        Ok(_) => "success",
        Err(AppError::EngineTimeout { .. }) => "timeout",
        Err(_) => "error",
    };
    metrics::record_engine(start.elapsed().as_secs_f64(), engine.model_name(), outcome);

    if let Err(e) = &result {
        tracing::warn!(model = engine.model_name(), error = %e, "Reasoning engine call failed");
    }
    result
}

fn map_transport_error(e: reqwest::Error, timeout: Duration) -> AppError {
    if e.is_timeout() {
        AppError::EngineTimeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        AppError::EngineUnavailable {
            message: format!("Request failed: {}", e),
        }
    }
}

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| AppError::Configuration {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Ollama text generation client
pub struct OllamaEngine {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaEngine {
    pub fn new(config: &ReasoningConfig) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            model: config.model.clone(),
            base_url: config.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ReasoningEngine for OllamaEngine {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaGenerateRequest {
            model: &options.model,
            prompt,
            system: options.system_prompt.as_deref(),
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, options.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EngineUnavailable {
                message: format!("Ollama error {}: {}", status, body),
            });
        }

        let body: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error(e, options.timeout))?;

        Ok(body.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible chat completion client
pub struct OpenAICompatibleEngine {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAICompatibleEngine {
    pub fn new(config: &ReasoningConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "reasoning.api_key is required for the openai provider".to_string(),
        })?;

        Ok(Self {
            client: build_client()?,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ReasoningEngine for OpenAICompatibleEngine {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let system = options
            .system_prompt
            .as_deref()
            .unwrap_or("You are a careful HR assistant.");

        let request = ChatRequest {
            model: &options.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(options.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| map_transport_error(e, options.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EngineUnavailable {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error(e, options.timeout))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::EngineUnavailable {
                message: "Empty response from LLM".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Create a reasoning engine based on configuration
pub fn create_engine(config: &ReasoningConfig) -> Result<Arc<dyn ReasoningEngine>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEngine::new(config)?)),
        "openai" => Ok(Arc::new(OpenAICompatibleEngine::new(config)?)),
        other => Err(AppError::Configuration {
            message: format!("Unknown reasoning provider: {}", other),
        }),
    }
}
