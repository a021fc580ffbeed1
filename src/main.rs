//! Document editor config gateway.

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use docs_gateway::collaborators::Collaborators;
use docs_gateway::config::{load_config, loader::default_config};
use docs_gateway::lifecycle::shutdown_signal;
use docs_gateway::observability::{logging, metrics};
use docs_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "docs-gateway")]
#[command(about = "Signed document editor configs for CRM-embedded editors", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => default_config()?,
    };

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "docs-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        config_build_ms = config.timeouts.config_build_ms,
        global_per_second = config.rate_limit.global_per_second,
        per_ip_per_second = config.rate_limit.per_ip_per_second,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let collaborators = Collaborators::from_config(&config)?;
    tracing::info!(users = config.users.len(), "Collaborators wired");

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, collaborators)?;
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    shutdown_signal().await;
    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
