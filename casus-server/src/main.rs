use casus_server::{backend_from_config, router, AppState, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    info!("Using model: {}", config.model);
    info!("Serving static files from {}", config.static_dir.display());
    if config.max_messages.is_none() {
        info!("CASUS_MAX_MESSAGES not set, forwarding full conversation history");
    }

    let backend = backend_from_config(&config);
    let app = router(AppState::new(backend, config.max_messages), &config.static_dir);

    info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
