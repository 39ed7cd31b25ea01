//! Session-multiplexed duplex transport: a JSON-RPC tool protocol over
//! plain HTTP, with one long-lived SSE stream per session for the
//! server-to-client direction and short-lived POSTs routed back by session
//! id for the client-to-server direction.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub mod app;
pub mod frame;
pub mod loopback;
pub mod registry;
pub mod transport;

use app::{build_router, AppState};
use loopback::LoopbackCore;
use registry::SessionRegistry;
use transport::ProtocolCore;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub grace_period: Duration,
}

pub async fn run_server(
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    run_server_with_core(config, Arc::new(LoopbackCore)).await
}

pub async fn run_server_with_core(
    config: ServerConfig,
    core: Arc<dyn ProtocolCore>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = Arc::new(SessionRegistry::new());
    let state = AppState::new(registry, core, config.grace_period);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "session-relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
