// Artifact production: persists the formatted exam and derives its PDF rendering.
// Every pipeline run writes into its own key directory, so concurrent requests never
// share a path. Files are written to a temp file in a staging directory beside the
// served tree and renamed into place; a reader sees either the previous complete file
// or the new complete file, never a partial one, and never a temp file.

pub mod page;
pub mod pdf;

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::stages::FormattedDocument;

pub use page::{default_page_config, PageConfig};
pub use pdf::{render_text_pdf, RenderedPdf};

/// Fixed name of the LaTeX source inside each key directory.
pub const SOURCE_FILE_NAME: &str = "test.tex";
/// Fixed name of the rendered PDF inside each key directory.
pub const PDF_FILE_NAME: &str = "test.pdf";

/// Directory name that scopes one request's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn from_uuid(id: Uuid) -> Self {
        ArtifactKey(id.simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything produced for one request.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub key: ArtifactKey,
    pub source_path: PathBuf,
    /// URL path of the source file under the public static root.
    pub public_locator: String,
    pub rendered: Option<RenderedPdf>,
    pub pdf_locator: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Writes artifacts under one output directory, served at `url_prefix`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
    /// Holds in-flight temp files. Same filesystem as `output_dir`, outside the served tree.
    staging_dir: PathBuf,
    url_prefix: String,
    page_config: PageConfig,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>, url_prefix: impl Into<String>, page_config: PageConfig) -> Self {
        let output_dir = output_dir.into();
        Self {
            staging_dir: staging_dir_for(&output_dir),
            output_dir,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            page_config,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persists `document` as `<output_dir>/<key>/test.tex` and, when `render` is set,
    /// lays it out as `<output_dir>/<key>/test.pdf`.
    ///
    /// The PDF is rendered before anything touches disk, so a render failure leaves
    /// no half-written key directory behind.
    pub async fn produce(
        &self,
        key: &ArtifactKey,
        document: &FormattedDocument,
        render: bool,
    ) -> Result<Artifact, AppError> {
        let rendered = if render {
            let text = document.markup.clone();
            let config = self.page_config.clone();
            let pdf = tokio::task::spawn_blocking(move || render_text_pdf(&text, &config))
                .await
                .map_err(|e| {
                    AppError::Internal(anyhow::anyhow!("spawn_blocking failed in PDF render: {e}"))
                })??;
            Some(pdf)
        } else {
            None
        };

        let dir = self.output_dir.join(key.as_str());
        let source_path = self
            .write_atomic(&dir, SOURCE_FILE_NAME, document.markup.clone().into_bytes())
            .await?;
        if let Some(pdf) = &rendered {
            self.write_atomic(&dir, PDF_FILE_NAME, pdf.bytes.clone()).await?;
        }

        let artifact = Artifact {
            public_locator: self.locator(&[key.as_str(), SOURCE_FILE_NAME]),
            pdf_locator: rendered
                .as_ref()
                .map(|_| self.locator(&[key.as_str(), PDF_FILE_NAME])),
            key: key.clone(),
            source_path,
            rendered,
            created_at: Utc::now(),
        };

        info!(
            key = %artifact.key,
            path = %artifact.source_path.display(),
            locator = %artifact.public_locator,
            pages = artifact.rendered.as_ref().map(|r| r.page_count).unwrap_or(0),
            lines = artifact.rendered.as_ref().map(|r| r.line_count).unwrap_or(0),
            unmapped_chars = artifact.rendered.as_ref().map(|r| r.unmapped_chars).unwrap_or(0),
            "artifact written"
        );
        Ok(artifact)
    }

    /// Saves caller-supplied LaTeX under a caller-chosen name directly in the output
    /// directory. Same-name writes are last-writer-wins. Returns the public locator.
    pub async fn save_named(&self, file_name: &str, content: &str) -> Result<String, AppError> {
        let file_name = sanitize_file_name(file_name)?;
        self.write_atomic(&self.output_dir, &file_name, content.as_bytes().to_vec())
            .await?;
        info!(file_name = %file_name, "named LaTeX file saved");
        Ok(self.locator(&[&file_name]))
    }

    fn locator(&self, segments: &[&str]) -> String {
        format!("{}/{}", self.url_prefix, segments.join("/"))
    }

    /// Creates `dir` if needed, then writes `bytes` to `dir/name` via a staged temp
    /// file and a rename.
    async fn write_atomic(&self, dir: &Path, name: &str, bytes: Vec<u8>) -> Result<PathBuf, AppError> {
        for needed in [dir, self.staging_dir.as_path()] {
            tokio::fs::create_dir_all(needed)
                .await
                .map_err(|e| AppError::io(&format!("creating {}", needed.display()), e))?;
        }

        let staging = self.staging_dir.clone();
        let target = dir.join(name);
        let path = target.clone();
        tokio::task::spawn_blocking(move || -> Result<(), AppError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&staging).map_err(|e| {
                AppError::io(&format!("creating temp file in {}", staging.display()), e)
            })?;
            tmp.write_all(&bytes)
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|e| AppError::io("writing temp file", e))?;
            tmp.persist(&path)
                .map_err(|e| AppError::io(&format!("renaming into {}", path.display()), e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("spawn_blocking failed in artifact write: {e}")))??;

        Ok(target)
    }
}

/// `<parent>/.<name>-staging` beside the output directory, so the rename stays on
/// one filesystem.
fn staging_dir_for(output_dir: &Path) -> PathBuf {
    match (output_dir.parent(), output_dir.file_name()) {
        (Some(parent), Some(name)) => {
            parent.join(format!(".{}-staging", name.to_string_lossy()))
        }
        _ => output_dir.join(".staging"),
    }
}

/// Accepts a bare file name; rejects anything that could escape the output directory.
/// Appends `.tex` when missing.
pub fn sanitize_file_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(AppError::validation(format!("invalid fileName '{raw}'")));
    }
    if name.to_ascii_lowercase().ends_with(".tex") {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}.tex"))
    }
}
