mod artifacts;
mod config;
mod errors;
mod generation;
mod llm_client;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::artifacts::{default_page_config, ArtifactStore};
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_PKG_NAME"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting examgen API v{}", env!("CARGO_PKG_VERSION"));

    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY not set; every request must carry its own apiKey");
    }

    // Initialize model client
    let llm = LlmClient::new(config.openai_base_url.clone())
        .context("failed to build model HTTP client")?;
    info!("Model client initialized (base url: {})", config.openai_base_url);

    // Artifact store: A4 Courier layout, files under <PUBLIC_DIR>/<ARTIFACT_SUBDIR>
    let page_config = default_page_config();
    let artifacts = ArtifactStore::new(
        config.artifact_dir(),
        config.artifact_url_prefix(),
        page_config,
    );
    info!(
        "Artifacts written to {} and served at {}",
        config.artifact_dir().display(),
        config.artifact_url_prefix()
    );

    let state = AppState::new(config.clone(), Arc::new(llm), artifacts);
    info!("Pipeline options: {:?}", state.pipeline_options);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
