//! Chat server
//!
//! Owns the listener, builds the registry actor and broadcast engine at
//! startup, and spawns a handler task per accepted connection.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::{handle_connection, HandlerContext};
use crate::registry::{Registry, RegistryHandle};

/// A bound, not yet running, chat server
pub struct ChatServer {
    listener: TcpListener,
    ctx: HandlerContext,
}

impl ChatServer {
    /// Bind the configured address and start the registry actor
    pub async fn bind(config: &ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(&config.addr).await?;
        Ok(Self::with_listener(listener, config))
    }

    /// Build a server around an existing listener
    pub fn with_listener(listener: TcpListener, config: &ServerConfig) -> Self {
        let registry = Registry::spawn(config.command_buffer, config.duplicate_login);
        info!(
            "Registry started (self_delivery={}, duplicate_login={:?})",
            config.self_delivery, config.duplicate_login
        );

        let ctx = HandlerContext {
            broadcaster: Broadcaster::new(registry.clone(), config.self_delivery),
            registry,
            push_buffer: config.push_buffer,
        };
        Self { listener, ctx }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the server's registry
    pub fn registry(&self) -> RegistryHandle {
        self.ctx.registry.clone()
    }

    /// Connection accept loop
    ///
    /// Runs until the task is dropped.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Server listening at {}", addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let ctx = self.ctx.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ctx).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
