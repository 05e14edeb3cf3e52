//! Resource protocol (CInP) server.
//!
//! # Architecture Overview
//!
//! ```text
//!   HTTP client
//!       │
//!       ▼
//!   ┌──────────┐    ┌─────────────┐    ┌────────────┐    ┌──────────────┐
//!   │  http    │───▶│  transport  │───▶│  routing   │───▶│  registry    │
//!   │  server  │    │  adapter    │    │ dispatcher │    │ ns/model/act │
//!   └──────────┘    └─────────────┘    └────────────┘    └──────┬───────┘
//!                                                                │
//!                                                                ▼
//!                                                        ┌──────────────┐
//!                                                        │ transaction  │
//!                                                        │ (per request)│
//!                                                        └──────────────┘
//!
//!   Cross-cutting: config, security (auth, CORS), observability, lifecycle
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use cinp_server::config::{load_config, ServerConfig};
use cinp_server::lifecycle::{signals, Shutdown};
use cinp_server::observability::{logging, metrics};
use cinp_server::transaction::MemoryStore;
use cinp_server::{demo, HttpServer};

#[derive(Parser, Debug)]
#[command(name = "cinp-server", version, about = "Resource protocol (CInP) server")]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init(&config.observability.log_filter);
    tracing::info!("cinp-server v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        root_path = %config.protocol.root_path,
        request_timeout_secs = config.timeouts.request_secs,
        users = config.auth.users.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = MemoryStore::new();
    let catalog = demo::build_catalog(&config.protocol, &store)?;
    let dispatcher = cinp_server::dispatcher(&config, catalog);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = HttpServer::new(&config, dispatcher);
    server.run(listener, shutdown.wait()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
