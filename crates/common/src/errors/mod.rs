//! Error types for HRDesk services
//!
//! Provides a single error enum for the query-time pipelines with:
//! - Distinct variants for index, embedding, engine and translation failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use crate::tabular::{TranslationFailureKind, TranslationPhase};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Resource errors (4xxx)
    ColumnNotFound,
    UnknownView,

    // Retrieval errors (5xxx)
    IndexNotFound,
    IndexIncompatible,

    // Dataset errors (6xxx)
    DatasetError,

    // External service errors (8xxx)
    EmbeddingUnavailable,
    EngineUnavailable,
    EngineTimeout,
    SynthesisFailed,
    TranslationFailed,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ComponentUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            ErrorCode::ColumnNotFound => 4001,
            ErrorCode::UnknownView => 4002,

            ErrorCode::IndexNotFound => 5001,
            ErrorCode::IndexIncompatible => 5002,

            ErrorCode::DatasetError => 6001,

            ErrorCode::EmbeddingUnavailable => 8001,
            ErrorCode::EngineUnavailable => 8002,
            ErrorCode::EngineTimeout => 8003,
            ErrorCode::SynthesisFailed => 8004,
            ErrorCode::TranslationFailed => 8005,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ComponentUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("Unknown data view: {view}")]
    UnknownView { view: String },

    // Retrieval errors
    #[error("Vector index not found at {path}: {reason}")]
    IndexNotFound { path: String, reason: String },

    #[error("Vector index incompatible: expected {expected}, found {found}")]
    IndexIncompatible { expected: String, found: String },

    // Dataset errors
    #[error("Dataset error: {message}")]
    Dataset { message: String },

    // External service errors
    #[error("Embedding backend unavailable: {message}")]
    EmbeddingUnavailable { message: String },

    #[error("Reasoning engine unavailable: {message}")]
    EngineUnavailable { message: String },

    #[error("Reasoning engine timed out after {timeout_ms}ms")]
    EngineTimeout { timeout_ms: u64 },

    #[error("Answer synthesis failed: {source}")]
    SynthesisFailed {
        #[source]
        source: Box<AppError>,
    },

    #[error("Translation failed while {phase}: {kind}: {reason}")]
    TranslationFailed {
        phase: TranslationPhase,
        kind: TranslationFailureKind,
        reason: String,
    },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{component} is unavailable: {reason}")]
    ComponentUnavailable {
        component: &'static str,
        reason: String,
    },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::ColumnNotFound { .. } => ErrorCode::ColumnNotFound,
            AppError::UnknownView { .. } => ErrorCode::UnknownView,
            AppError::IndexNotFound { .. } => ErrorCode::IndexNotFound,
            AppError::IndexIncompatible { .. } => ErrorCode::IndexIncompatible,
            AppError::Dataset { .. } => ErrorCode::DatasetError,
            AppError::EmbeddingUnavailable { .. } => ErrorCode::EmbeddingUnavailable,
            AppError::EngineUnavailable { .. } => ErrorCode::EngineUnavailable,
            AppError::EngineTimeout { .. } => ErrorCode::EngineTimeout,
            AppError::SynthesisFailed { .. } => ErrorCode::SynthesisFailed,
            AppError::TranslationFailed { .. } => ErrorCode::TranslationFailed,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ComponentUnavailable { .. } => ErrorCode::ComponentUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidFormat { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            AppError::ColumnNotFound { .. } | AppError::UnknownView { .. } => {
                StatusCode::NOT_FOUND
            }

            // 422 Unprocessable Entity
            AppError::TranslationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 500 Internal Server Error
            AppError::Dataset { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingUnavailable { .. }
            | AppError::EngineUnavailable { .. }
            | AppError::SynthesisFailed { .. } => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::EngineTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,

            // 503 Service Unavailable
            AppError::IndexNotFound { .. }
            | AppError::IndexIncompatible { .. }
            | AppError::ComponentUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Message suitable for showing to the person who asked the question
    pub fn user_message(&self) -> String {
        match self {
            AppError::IndexNotFound { .. } | AppError::IndexIncompatible { .. } => {
                "The policy knowledge base is not available. Run the ingestion step and try again."
                    .to_string()
            }
            AppError::EngineTimeout { .. } => {
                "The reasoning engine took too long to respond. Please try again.".to_string()
            }
            AppError::EngineUnavailable { .. } | AppError::EmbeddingUnavailable { .. } => {
                "A model backend is not reachable. Check that it is running.".to_string()
            }
            AppError::SynthesisFailed { .. } => {
                "An answer could not be generated for this question.".to_string()
            }
            AppError::TranslationFailed { .. } => {
                format!("The question could not be answered from the employee data ({self}).")
            }
            _ => self.to_string(),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let detail = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %detail,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %detail,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message: self.user_message(),
                detail,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Dataset {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::IndexNotFound {
            path: "/tmp/index".into(),
            reason: "manifest.json is missing".into(),
        };
        assert_eq!(err.code(), ErrorCode::IndexNotFound);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_translation_error_is_client_error() {
        let err = AppError::TranslationFailed {
            phase: TranslationPhase::Translating,
            kind: TranslationFailureKind::Unsafe,
            reason: "filesystem access".into(),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.is_client_error());
        assert!(err.user_message().contains("employee data"));
    }

    #[test]
    fn test_synthesis_failure_keeps_source() {
        let err = AppError::SynthesisFailed {
            source: Box::new(AppError::EngineTimeout { timeout_ms: 500 }),
        };
        assert_eq!(err.code(), ErrorCode::SynthesisFailed);
        assert!(err.to_string().contains("500ms"));
        assert!(err.is_server_error());
    }
}
