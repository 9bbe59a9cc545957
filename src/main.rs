//! wess sample server
//!
//! Serves `GET /hello`, a WebSocket echo at `/ws` and, optionally, a static
//! frontend at `/`.
//!
//! # Configuration
//!
//! ```text
//! defaults → --config <file.toml> → environment (PORT, PROBE_PORT, ...) → CLI flags
//! ```
//!
//! The process exits non-zero when startup or shutdown fails.

use std::path::PathBuf;

use axum::{
    extract::ws::{Message, WebSocket},
    http::{Method, StatusCode},
};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};

use wess::config::{config_from_env, load_config};
use wess::observability::logging::{init_logging, DEFAULT_FILTER};
use wess::{Server, WebSocketContext};

#[derive(Parser)]
#[command(name = "wess")]
#[command(about = "Sample HTTP server with health probes and graceful shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Application port
    #[arg(short, long)]
    port: Option<u16>,

    /// Health probe port (0 disables the probes)
    #[arg(long)]
    probe_port: Option<u16>,

    /// Directory holding the frontend build
    #[arg(long)]
    frontend: Option<PathBuf>,

    /// Subdirectory of the frontend directory to serve at `/`
    #[arg(long, default_value = "dist")]
    frontend_subpath: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(DEFAULT_FILTER);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wess starting");

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => config_from_env()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(probe_port) = cli.probe_port {
        config.probe_port = probe_port;
    }

    tracing::info!(
        address = %config.address,
        port = config.port,
        probe_port = config.probe_port,
        "Configuration loaded"
    );

    let mut server = Server::new(config);
    server.add_route(Method::GET, "/hello", hello)?;
    server.add_websocket_route("/ws", echo)?;
    if let Some(root) = &cli.frontend {
        server.add_frontend("/", root, &cli.frontend_subpath)?;
    }

    let (shutdown, _stop) = server.start().await?;
    shutdown.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn hello() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Hello, World!")
}

async fn echo(socket: WebSocket, context: WebSocketContext) {
    tracing::info!(remote_addr = ?context.remote_addr, uri = %context.uri, "WebSocket connection");

    let (mut sender, mut receiver) = socket.split();
    if sender.send(Message::Text("Hello, World!".into())).await.is_err() {
        return;
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(message @ (Message::Text(_) | Message::Binary(_))) => {
                if sender.send(message).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(error = %err, "WebSocket receive failed");
                break;
            }
        }
    }

    tracing::debug!(remote_addr = ?context.remote_addr, "WebSocket closed");
}
