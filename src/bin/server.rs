//! aether HTTP server binary.
//!
//! Loads the ingredient catalog, rule corpus and compliance table once, then
//! serves the formulation endpoints.
//!
//! # Environment Variables
//!
//! - `PORT`: HTTP port (default: 8080)
//! - `AETHER_CONFIG`: Optional YAML settings file
//! - `AETHER_DATA_DIR`: Directory overriding the built-in data files
//! - `AETHER_RETRIEVAL_MODE`: `semantic` (default) or `keyword`
//! - `AETHER_EMBEDDING_PROVIDER`: `hashing` (default) or `openai`
//! - `OPENAI_API_KEY`: Required for the `openai` embedding provider
//! - `RUST_LOG`: Tracing filter (default: "info,aether=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;

use anyhow::Context;
use aether::config::Settings;
use aether::formulation::FormulationEngine;
use aether::server::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aether=debug".into()),
        )
        .init();

    let settings = match std::env::var("AETHER_CONFIG") {
        Ok(path) => Settings::from_yaml_file(&path)
            .with_context(|| format!("Failed to load settings from {path}"))?,
        Err(_) => Settings::from_env(),
    };
    let bind_addr = format!("0.0.0.0:{}", settings.port);

    let engine = FormulationEngine::from_settings(settings)
        .context("Failed to load formulation data")?;
    let app = app_router(AppState::new(Arc::new(engine)));

    tracing::info!("aether server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                  : liveness probe");
    tracing::info!("  POST /api/formulation/generate: generate a formula");
    tracing::info!("  POST /api/formulation/validate: validate a draft formula");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;

    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
