//! Answer synthesizer - generates grounded answers from retrieved context
//!
//! Builds one "stuff" prompt with every retrieved chunk (most relevant
//! first) and the question, then returns the engine's text together with
//! the chunks that were supplied. Traceability is over what was available
//! to the engine; whether it actually used a chunk is not checked.

use crate::errors::{AppError, Result};
use crate::llm::{generate_with_timeout, GenerationOptions, ReasoningEngine};
use crate::models::Chunk;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Answer returned when retrieval finds nothing to ground on
pub const NO_CONTEXT_ANSWER: &str =
    "I could not find any policy passages relevant to this question.";

const GROUNDING_INSTRUCTION: &str = "Use the following pieces of context from company policy \
documents to answer the question at the end. Answer only from this context. If the context does \
not contain the answer, say that you don't know; do not make up an answer.";

/// Synthesized answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    /// Generated answer text
    pub answer: String,

    /// Every chunk supplied as context, in prompt order
    pub sources: Vec<Chunk>,
}

/// Build the synthesis prompt
pub fn build_prompt(question: &str, chunks: &[Chunk]) -> String {
    let mut prompt = format!("{}\n\nContext:\n", GROUNDING_INSTRUCTION);

    for (i, chunk) in chunks.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[{}] {} (page {})\n{}\n",
            i + 1,
            chunk.source.label(),
            chunk.source.page,
            chunk.text.trim()
        ));
    }

    prompt.push_str(&format!("\nQuestion: {}\nHelpful Answer:", question.trim()));
    prompt
}

/// Synthesizer for generating answers
pub struct AnswerSynthesizer {
    engine: Arc<dyn ReasoningEngine>,
    options: GenerationOptions,
}

impl AnswerSynthesizer {
    pub fn new(engine: Arc<dyn ReasoningEngine>, options: GenerationOptions) -> Self {
        Self { engine, options }
    }

    /// Synthesize an answer from the ranked context chunks.
    ///
    /// Any engine failure, including a timeout or a blank reply, becomes
    /// `SynthesisFailed`; no partial answer is returned.
    #[instrument(skip(self, chunks), fields(context_chunks = chunks.len(), model = %self.options.model))]
    pub async fn synthesize(&self, question: &str, chunks: &[Chunk]) -> Result<SynthesizedAnswer> {
        if chunks.is_empty() {
            info!("No context retrieved, skipping generation");
            return Ok(SynthesizedAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let prompt = build_prompt(question, chunks);

        let response = generate_with_timeout(self.engine.as_ref(), &prompt, &self.options)
            .await
            .map_err(|e| AppError::SynthesisFailed {
                source: Box::new(e),
            })?;

        let answer = response.trim();
        if answer.is_empty() {
            return Err(AppError::SynthesisFailed {
                source: Box::new(AppError::EngineUnavailable {
                    message: "engine returned an empty answer".to_string(),
                }),
            });
        }

        Ok(SynthesizedAnswer {
            answer: answer.to_string(),
            sources: chunks.to_vec(),
        })
    }
}
