use std::sync::Arc;

use anyhow::anyhow;
use tokio::net::TcpListener;
use tracing::info;

use xiaozhi_gateway::{config, routes, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (must happen before config loading).
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Crypto provider for wss:// upstream connections; must be installed
    // before the first TLS handshake.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install default crypto provider"))?;

    // Configuration errors abort the process.
    let server_config = ServerConfig::load().map_err(|e| anyhow!(e.to_string()))?;
    config::install(server_config);

    let state = Arc::new(AppState::default());
    let app = routes::create_router(state);

    let addr = config::snapshot().listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("listening on ws://{addr}/xiaozhi/v1/");

    axum::serve(listener, app).await?;
    Ok(())
}
