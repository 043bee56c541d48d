mod analysis;
mod config;
mod errors;
mod extraction;
mod llm_client;
mod nlp;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::feedback::build_feedback_generator;
use crate::config::Config;
use crate::nlp::load_models;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobMatch v{}", env!("CARGO_PKG_VERSION"));

    // Load both models once; inference only borrows them from here on
    let model_config = config.clone();
    let models = tokio::task::spawn_blocking(move || load_models(&model_config))
        .await
        .context("Model loading task failed")??;

    let feedback = build_feedback_generator(&config)?;
    info!("Feedback backend: {}", feedback.backend());

    let state = AppState {
        config: config.clone(),
        embedder: models.embedder,
        recognizer: models.recognizer,
        feedback,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
