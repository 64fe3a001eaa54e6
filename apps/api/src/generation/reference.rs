//! Reference material loading. Turns an optional upload into plain text.
//!
//! Absence is never an error: no file means an empty `ReferenceText`.

use bytes::Bytes;
use tracing::info;

use crate::errors::AppError;

/// An uploaded multipart file part.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub bytes: Bytes,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl UploadedFile {
    fn is_pdf(&self) -> bool {
        self.content_type.as_deref() == Some("application/pdf")
            || self
                .file_name
                .as_deref()
                .map(|n| n.to_ascii_lowercase().ends_with(".pdf"))
                .unwrap_or(false)
            || self.bytes.starts_with(b"%PDF-")
    }
}

/// Text extracted from the reference upload. Empty when nothing was supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceText(String);

impl ReferenceText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for ReferenceText {
    fn from(text: String) -> Self {
        ReferenceText(text)
    }
}

/// Extracts the full text of an optional upload.
///
/// Plain uploads are decoded as UTF-8 (lossy). PDF uploads go through `pdf-extract`
/// on the blocking pool.
pub async fn load_reference(file: Option<&UploadedFile>) -> Result<ReferenceText, AppError> {
    let Some(file) = file.filter(|f| !f.bytes.is_empty()) else {
        return Ok(ReferenceText::default());
    };

    let text = if file.is_pdf() {
        let bytes = file.bytes.clone();
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| {
                // pdf-extract panics on some malformed inputs.
                if e.is_panic() {
                    AppError::Filesystem("reference PDF could not be read: parser panicked".to_string())
                } else {
                    AppError::Internal(anyhow::anyhow!("spawn_blocking failed in pdf extraction: {e}"))
                }
            })?
            .map_err(|e| AppError::Filesystem(format!("reference PDF could not be read: {e}")))?
    } else {
        String::from_utf8_lossy(&file.bytes).into_owned()
    };

    info!(
        file_name = file.file_name.as_deref().unwrap_or("<unnamed>"),
        bytes = file.bytes.len(),
        chars = text.chars().count(),
        "reference material loaded"
    );
    Ok(ReferenceText(text))
}
