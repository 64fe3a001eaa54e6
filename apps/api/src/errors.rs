use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::LlmError;

/// The one message a caller ever sees when generation fails past validation.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate test";

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Only `InputValidation` reaches the caller verbatim. Every other variant is logged
/// and collapses into the generic failure envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    InputValidation(String),

    #[error("Upstream generation error: {0}")]
    UpstreamGeneration(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::InputValidation(msg.into())
    }

    /// Wraps an I/O failure with the operation that hit it.
    pub fn io(action: &str, err: std::io::Error) -> Self {
        AppError::Filesystem(format!("{action}: {err}"))
    }

    pub fn upstream(stage: &str, err: LlmError) -> Self {
        AppError::UpstreamGeneration(format!("{stage} stage call failed: {err}"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InputValidation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Extractor rejections would otherwise answer with axum's plain-text body.
impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::InputValidation(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InputValidation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::InputValidation(msg) => {
                tracing::info!("Rejected request: {msg}");
                msg.clone()
            }
            AppError::UpstreamGeneration(msg) => {
                tracing::error!("Upstream generation error: {msg}");
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            AppError::Filesystem(msg) => {
                tracing::error!("Filesystem error: {msg}");
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            AppError::Render(msg) => {
                tracing::error!("Render error: {msg}");
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                GENERIC_FAILURE_MESSAGE.to_string()
            }
        };

        (self.status(), Json(json!({ "message": message }))).into_response()
    }
}
