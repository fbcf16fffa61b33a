mod config;
mod gemini;
mod models;
mod prompt;
mod routes;
mod state;
mod upload;

use anyhow::Context;
use axum::{extract::DefaultBodyLimit, Router, routing::{get, patch, post, put}};
use routes::{
    clear_image, create_session, delete_session, get_options, get_session, set_edit_prompt, set_mode, submit,
    update_generation, update_thumbnail, upload_image, AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{CorsLayer, Any};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::gemini::{Dispatcher, GeminiClient};

/// Uploaded images arrive as raw bodies; phone photos easily exceed axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/options", get(get_options))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/mode", put(set_mode))
        .route("/api/sessions/:id/generation", patch(update_generation))
        .route("/api/sessions/:id/thumbnail", patch(update_thumbnail))
        .route("/api/sessions/:id/edit-prompt", put(set_edit_prompt))
        .route("/api/sessions/:id/images/:slot", put(upload_image).delete(clear_image))
        .route("/api/sessions/:id/submit", post(submit))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env().context("refusing to start")?;
    tracing::info!(model = %config.image_model, base = %config.api_base, "Using Gemini image model");

    let client = GeminiClient::new(&config).context("failed to build HTTP client")?;
    let state = AppState::new(Dispatcher::new(Arc::new(client)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}
