//! Policy question handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use hrdesk_common::{
    errors::{AppError, Result},
    models::Citation,
};

/// Policy question request
#[derive(Debug, Deserialize, Validate)]
pub struct AskPolicyRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    /// Chunks to retrieve (defaults to `retrieval.k`)
    #[validate(range(min = 1, max = 20))]
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct AskPolicyResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub processing_time_ms: u64,
}

/// POST /v1/policy/ask
pub async fn ask_policy(
    State(state): State<AppState>,
    Json(request): Json<AskPolicyRequest>,
) -> Result<Json<AskPolicyResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let result = state
        .assistant
        .ask_policy_with_k(&request.question, request.k)
        .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        citations = result.citations.len(),
        latency_ms = processing_time_ms,
        "Policy question answered"
    );

    Ok(Json(AskPolicyResponse {
        answer: result.answer,
        citations: result.citations,
        processing_time_ms,
    }))
}
