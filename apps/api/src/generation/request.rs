//! Input normalization: raw form fields → validated `GenerationRequest`.
//!
//! Pure. No network or filesystem access happens here, so every rejection
//! precedes any model call.

use std::fmt;

use crate::errors::AppError;
use crate::generation::reference::UploadedFile;
use crate::llm_client::ModelId;

pub const MIN_PROMPT_CHARS: usize = 3;
pub const MAX_PROMPT_CHARS: usize = 4000;
pub const MIN_CREDENTIAL_CHARS: usize = 3;

/// Raw multipart fields exactly as submitted. Every field may be missing.
#[derive(Debug, Default)]
pub struct RawGenerationForm {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub difficulty: Option<String>,
    pub additional_instructions: Option<String>,
    pub file: Option<UploadedFile>,
}

/// Opaque secret passed through to the model API. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Exam difficulty on a 1 (easiest) to 10 (hardest) scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: i64) -> Option<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Some(Difficulty(value as u8))
        } else {
            None
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty(5)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated, defaulted request. Immutable once built.
#[derive(Debug)]
pub struct GenerationRequest {
    pub credential: Credential,
    pub model: ModelId,
    pub topic_prompt: String,
    pub difficulty: Difficulty,
    pub additional_instructions: String,
    pub reference_file: Option<UploadedFile>,
}

/// Validates `form`, falling back to `server_credential` when the form carries no key.
pub fn normalize(
    form: RawGenerationForm,
    server_credential: Option<&str>,
) -> Result<GenerationRequest, AppError> {
    let topic_prompt = non_blank(form.prompt)
        .ok_or_else(|| AppError::validation("prompt is required"))?;
    let prompt_chars = topic_prompt.chars().count();
    if prompt_chars < MIN_PROMPT_CHARS {
        return Err(AppError::validation(format!(
            "prompt must be at least {MIN_PROMPT_CHARS} characters"
        )));
    }
    if prompt_chars > MAX_PROMPT_CHARS {
        return Err(AppError::validation(format!(
            "prompt must be at most {MAX_PROMPT_CHARS} characters"
        )));
    }

    let model = non_blank(form.model)
        .ok_or_else(|| AppError::validation("model is required"))?
        .parse::<ModelId>()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let difficulty = match non_blank(form.difficulty) {
        None => Difficulty::default(),
        Some(raw) => {
            let value = raw.parse::<i64>().map_err(|_| {
                AppError::validation(format!("difficulty must be an integer, got '{raw}'"))
            })?;
            Difficulty::new(value).ok_or_else(|| {
                AppError::validation(format!(
                    "difficulty must be between {} and {}",
                    Difficulty::MIN,
                    Difficulty::MAX
                ))
            })?
        }
    };

    let credential = match non_blank(form.api_key) {
        Some(key) if key.chars().count() < MIN_CREDENTIAL_CHARS => {
            return Err(AppError::validation("apiKey is too short"));
        }
        Some(key) => Credential(key),
        None => server_credential
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| Credential(k.to_string()))
            .ok_or_else(|| AppError::validation("apiKey is required"))?,
    };

    Ok(GenerationRequest {
        credential,
        model,
        topic_prompt,
        difficulty,
        additional_instructions: form
            .additional_instructions
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        reference_file: form.file,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
