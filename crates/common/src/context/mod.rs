//! Policy question answering
//!
//! - Retrieval: embed the question and fetch the nearest chunks
//! - Synthesis: ground the reasoning engine's answer in those chunks

mod retriever;
mod synthesizer;

pub use retriever::{RetrievedChunk, Retriever};
pub use synthesizer::{build_prompt, AnswerSynthesizer, SynthesizedAnswer, NO_CONTEXT_ANSWER};
