//! Employee data handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use hrdesk_common::{
    errors::{AppError, Result},
    tabular::{DataView, TableView},
};

/// Data question request
#[derive(Debug, Deserialize, Validate)]
pub struct AskDataRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
}

#[derive(Serialize)]
pub struct AskDataResponse {
    pub answer: String,
    pub processing_time_ms: u64,
}

/// POST /v1/data/ask
pub async fn ask_data(
    State(state): State<AppState>,
    Json(request): Json<AskDataRequest>,
) -> Result<Json<AskDataResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let result = state.assistant.ask_data(&request.question).await?;

    Ok(Json(AskDataResponse {
        answer: result.answer,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}

/// GET /v1/data/views/{view}
pub async fn get_view(
    State(state): State<AppState>,
    Path(view): Path<String>,
) -> Result<Json<TableView>> {
    let view: DataView = view.parse()?;
    Ok(Json(state.assistant.view(view)?))
}
