use tokio_util::sync::CancellationToken;
use tracing::info;

mod app;
mod auth;
mod error;
mod http;
mod hub;
mod ws;

use app::Application;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "artifactor_hub=info,tower_http=info".into()),
        )
        .init();

    // load config: explicit path > ARTIFACTOR_CONFIG env > ~/.artifactor/artifactor.toml
    let config_path = std::env::var("ARTIFACTOR_CONFIG").ok();
    let config = artifactor_core::config::ArtifactorConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        artifactor_core::config::ArtifactorConfig::default()
    });

    let shutdown = CancellationToken::new();
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            ctrl_c_shutdown.cancel();
        }
    });

    let app = Application::build(config)?;
    app.run(shutdown).await
}
