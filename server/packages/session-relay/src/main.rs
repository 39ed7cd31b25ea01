use std::time::Duration;

use agent_studio_session_relay::{app, run_server, ServerConfig};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "session-relay")]
#[command(about = "Session-multiplexed SSE transport for the studio tool protocol", version)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 7410)]
    port: u16,

    /// Delay between stream abort and session teardown, in milliseconds.
    #[arg(long)]
    grace_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(error = %err, "session-relay failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    run_server(ServerConfig {
        host: cli.host,
        port: cli.port,
        grace_period: cli
            .grace_ms
            .map(Duration::from_millis)
            .unwrap_or(app::DEFAULT_GRACE_PERIOD),
    })
    .await
}
