use anyhow::Context;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod common;
mod config;
mod docs;
mod infrastructure;
mod modules;
mod routes;
mod state;
mod workers;

use config::settings::AppConfig;
use infrastructure::encoder::FfmpegEncoder;
use infrastructure::storage::artifacts::DownloadStore;
use modules::job::readiness;
use modules::job::service::Coordinator;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("compressor=info,tower_http=info")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new();
    for dir in [config.uploads_dir(), config.results_dir(), config.sessions_dir()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let downloads = DownloadStore::new(config.download_ttl());
    let factory = FfmpegEncoder::factory(config.encoder_path.clone(), config.sessions_dir());
    let coordinator = Coordinator::new(config.clone(), factory, downloads.clone());

    let report = readiness::probe(&config.encoder_path).await;
    coordinator.apply_readiness(&report).await;

    let port = config.server_port;
    let app = app::create_app(AppState::new(config, coordinator, downloads));

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
