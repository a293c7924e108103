use std::sync::Arc;

use anyhow::Context;
use log::{info, LevelFilter};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use messenger_svc::{config::ServerConfig, server, MessengerService};
use protocol_node::MemoryNetwork;

fn init_logging(cfg: &ServerConfig) {
    let level = match cfg.log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    // RUST_LOG directives override the configured level.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    init_logging(&config);

    let network = MemoryNetwork::new();
    let node = network.register_account(&config.display_name).await;
    let service = MessengerService::connect(node, config.service_options())
        .await
        .context("Failed to connect to protocol node")?;

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .context(format!("Failed to bind {}", config.listen_addr))?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down");
            }
            shutdown.cancel();
        }
    });

    server::serve(listener, Arc::new(service), shutdown)
        .await
        .context("Server failed")?;
    info!("Shutdown complete");
    Ok(())
}
