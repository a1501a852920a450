mod app;
mod config;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use services::{DocumentAnalyzer, OpenAiClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = config::Settings::from_env()?;

    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        model = %settings.openai_model,
        "Starting document analysis service"
    );

    let backend = OpenAiClient::new(
        &settings.openai_base_url,
        &settings.openai_api_key,
        &settings.openai_model,
        settings.ai_timeout_seconds,
    )
    .context("Failed to create model backend client")?;

    let analyzer = DocumentAnalyzer::new(Arc::new(backend))
        .with_health_ttl(Duration::from_secs(settings.health_cache_seconds));

    // Check the backend without holding up startup
    tokio::spawn({
        let analyzer = analyzer.clone();
        async move {
            if analyzer.backend_health().await {
                tracing::info!("Model backend is reachable");
            }
        }
    });

    let state = app::AppState::new(settings.clone(), analyzer);
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
