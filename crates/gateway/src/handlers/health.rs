//! Health check handlers

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use hrdesk_common::assistant::AssistantStatus;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub embedding_model: String,
    pub reasoning_model: String,
    pub checks: AssistantStatus,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: hrdesk_common::VERSION,
    })
}

/// Readiness probe - ready when both pipelines loaded
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let checks = state.assistant.status();
    let all_ready = checks.policy_ready && checks.data_ready;

    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if all_ready { "ready" } else { "not_ready" }.to_string(),
            embedding_model: state.config.embedding.model.clone(),
            reasoning_model: state.config.reasoning.model.clone(),
            checks,
        }),
    )
}
