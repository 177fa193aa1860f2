//! Broadcast chat server - Entry Point
//!
//! Parses arguments, binds the listener and runs the accept loop.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use broadcast_chat::{ChatServer, ServerArgs, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=broadcast_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("broadcast_chat=info,chat_server=info")),
        )
        .init();

    let config = ServerConfig::from(ServerArgs::parse());

    info!("Starting server on {}", config.addr);
    let server = ChatServer::bind(&config).await?;
    server.run().await;

    Ok(())
}
