//! Process entry point for the fleet gateway.
//!
//! This binary is wiring only, not core logic: it reads process environment
//! for bind address/timeouts, initializes structured logging, constructs
//! the orchestrator with production collaborators (a real Axum WebSocket
//! listener, a file-backed checkpoint store), and runs it until a shutdown
//! signal. No routing/session/registry decision lives here.

use std::sync::Arc;

use clap::Parser;
use fleetgate_checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
use fleetgate_gateway::{AxumWsServerFactory, GatewayConfig, Orchestrator};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fleetgate", about = "Fleet gateway for a multi-channel agent runtime")]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides `FLEETGATE_BIND_ADDR`).
    #[arg(long)]
    bind: Option<String>,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json().with_target(true).with_thread_ids(false)).init();
    } else {
        registry.with(fmt::layer().with_target(false).with_thread_ids(false).with_ansi(true)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "fleetgate starting");

    let mut config = GatewayConfig::from_env();
    if let Some(bind) = cli.bind {
        config.bind_addr = bind.parse()?;
    }

    let checkpoint_store: Arc<dyn CheckpointStore> = match &config.checkpoint_path {
        Some(path) => Arc::new(FileCheckpointStore::new(path.clone())),
        None => Arc::new(InMemoryCheckpointStore::new()),
    };

    let transport = AxumWsServerFactory::new(config.bind_addr);
    let serve_transport = Arc::clone(&transport);
    let serve_handle = tokio::spawn(async move {
        if let Err(e) = serve_transport.serve().await {
            tracing::error!(error = %e, "fleetgate: websocket listener stopped unexpectedly");
        }
    });

    let orchestrator = Orchestrator::new(config, transport, checkpoint_store);
    orchestrator.start().await;

    tokio::signal::ctrl_c().await?;
    info!("fleetgate: shutdown signal received");

    orchestrator.stop().await;
    serve_handle.abort();

    Ok(())
}
