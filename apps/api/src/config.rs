use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::generation::pipeline::PipelineOptions;
use crate::generation::response::ResponseFields;
use crate::llm_client::{ModelId, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS};

/// Application configuration loaded from environment variables.
/// Every variable is optional; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Server-side credential used when a request does not carry `apiKey`.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    /// Root of the public static-asset tree.
    pub public_dir: PathBuf,
    /// Directory under `public_dir` where artifacts land; also the URL prefix.
    pub artifact_subdir: String,
    pub max_output_tokens: u32,
    pub min_questions: u32,
    /// Pins the formatting stage to one model. `None` reuses the request's model.
    pub formatting_model: Option<ModelId>,
    pub honor_additional_instructions: bool,
    pub include_worked_example: bool,
    pub render_pdf: bool,
    pub response_fields: ResponseFields,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let formatting_model = get("FORMATTING_MODEL")
            .map(|v| v.parse::<ModelId>())
            .transpose()
            .context("FORMATTING_MODEL must name an allow-listed model")?;

        let response_fields = get("RESPONSE_FIELDS")
            .map(|v| v.parse::<ResponseFields>())
            .transpose()
            .context("RESPONSE_FIELDS must be a comma-separated list of content, latex, filePath, pdfData")?
            .unwrap_or_default();

        Ok(Config {
            port: parse_or(&get, "PORT", 8080)?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            public_dir: get("PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            artifact_subdir: get("ARTIFACT_SUBDIR")
                .map(|v| v.trim_matches('/').to_string())
                .unwrap_or_else(|| "generatedTests".to_string()),
            max_output_tokens: parse_or(&get, "MAX_OUTPUT_TOKENS", DEFAULT_MAX_TOKENS)?,
            min_questions: parse_or(&get, "MIN_QUESTIONS", 8)?,
            formatting_model,
            honor_additional_instructions: parse_bool_or(&get, "HONOR_ADDITIONAL_INSTRUCTIONS", true)?,
            include_worked_example: parse_bool_or(&get, "INCLUDE_WORKED_EXAMPLE", false)?,
            render_pdf: parse_bool_or(&get, "RENDER_PDF", true)?,
            response_fields,
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
        })
    }

    /// Absolute-or-relative directory artifacts are written to.
    pub fn artifact_dir(&self) -> PathBuf {
        self.public_dir.join(&self.artifact_subdir)
    }

    /// URL prefix artifacts are served under, e.g. `/generatedTests`.
    pub fn artifact_url_prefix(&self) -> String {
        format!("/{}", self.artifact_subdir)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            formatting_model: self.formatting_model,
            honor_additional_instructions: self.honor_additional_instructions,
            include_worked_example: self.include_worked_example,
            render_pdf: self.render_pdf,
            max_output_tokens: self.max_output_tokens,
            min_questions: self.min_questions,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("{key} must be a boolean, got '{v}'"),
        },
    }
}
