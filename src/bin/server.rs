use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use kabootar::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        audience = ?config.audience,
        "kabootar server starting"
    );

    let srv = Arc::new(Server::new(&config)?);
    let addr = config.addr();

    tokio::select! {
        res = srv.listen_and_serve(&addr) => res?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down…");
        }
    }
    Ok(())
}

fn init_tracing(config: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
