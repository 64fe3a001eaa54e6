//! Axum route handlers for the exam generation API.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        Multipart, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::generation::pipeline::run_pipeline;
use crate::generation::reference::UploadedFile;
use crate::generation::request::{normalize, RawGenerationForm};
use crate::generation::response::{assemble_response, ExamResponse};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveLatexRequest {
    pub content: String,
    pub file_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveLatexResponse {
    pub file_path: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/save-form-data  (alias: POST /api/v1/exams)
///
/// Multipart form → validated request → two-stage generation → artifacts.
/// Validation errors return 400 with the reason; anything later returns the
/// generic failure envelope.
pub async fn handle_generate_exam(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExamResponse>, AppError> {
    let form = read_generation_form(multipart?).await?;
    let request = normalize(form, state.config.openai_api_key.as_deref())?;

    let output = run_pipeline(
        state.llm.as_ref(),
        &state.artifacts,
        &state.pipeline_options,
        request,
    )
    .await?;

    Ok(Json(assemble_response(output, state.config.response_fields)))
}

/// POST /api/save-latex
///
/// Saves caller-supplied LaTeX under a caller-chosen file name and returns its
/// public path.
pub async fn handle_save_latex(
    State(state): State<AppState>,
    request: Result<Json<SaveLatexRequest>, JsonRejection>,
) -> Result<Json<SaveLatexResponse>, AppError> {
    let Json(request) = request?;
    let file_path = state
        .artifacts
        .save_named(&request.file_name, &request.content)
        .await?;
    Ok(Json(SaveLatexResponse { file_path }))
}

// ────────────────────────────────────────────────────────────────────────────
// Multipart decoding
// ────────────────────────────────────────────────────────────────────────────

/// Collects the known form fields. Unknown fields are drained and ignored.
async fn read_generation_form(mut multipart: Multipart) -> Result<RawGenerationForm, AppError> {
    let mut form = RawGenerationForm::default();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(String::from);
                let content_type = field.content_type().map(String::from);
                let bytes = field.bytes().await.map_err(malformed)?;
                form.file = Some(UploadedFile {
                    bytes,
                    file_name,
                    content_type,
                });
            }
            "apiKey" => form.api_key = Some(field.text().await.map_err(malformed)?),
            "model" => form.model = Some(field.text().await.map_err(malformed)?),
            "prompt" => form.prompt = Some(field.text().await.map_err(malformed)?),
            "difficulty" => form.difficulty = Some(field.text().await.map_err(malformed)?),
            "additionalInstructions" => {
                form.additional_instructions = Some(field.text().await.map_err(malformed)?)
            }
            _ => {
                field.bytes().await.map_err(malformed)?;
            }
        }
    }

    Ok(form)
}

fn malformed(err: MultipartError) -> AppError {
    AppError::validation(format!("malformed multipart body: {}", err.body_text()))
}
