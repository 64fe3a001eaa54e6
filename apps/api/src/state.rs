use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::generation::pipeline::PipelineOptions;
use crate::llm_client::TextModel;

/// Shared application state injected into all route handlers via Axum extractors.
/// Immutable after startup; per-request data never lives here.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable model backend. Default: `LlmClient` against the configured base URL.
    pub llm: Arc<dyn TextModel>,
    pub config: Config,
    pub artifacts: ArtifactStore,
    pub pipeline_options: PipelineOptions,
}

impl AppState {
    pub fn new(config: Config, llm: Arc<dyn TextModel>, artifacts: ArtifactStore) -> Self {
        Self {
            pipeline_options: config.pipeline_options(),
            llm,
            config,
            artifacts,
        }
    }
}
