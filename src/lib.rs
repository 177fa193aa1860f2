//! Broadcast Chat Library
//!
//! A real-time text chat service over tokio-tungstenite: every connected
//! client receives every message any client sends.
//!
//! # Features
//! - Login as a long-lived push stream
//! - Logout and SendMessage as unary calls
//! - Concurrent fan-out with per-recipient failure isolation
//! - Eviction of dead peers
//! - Duplex client driver (Receiver + Producer)
//!
//! # Architecture
//! The connection registry is an actor fed through `mpsc` channels:
//! - `Registry` is the single owner of the session table
//! - Each connection has a `handler` task talking to it through `RegistryHandle`
//! - `Broadcaster` snapshots the registry and pushes to each session in its own task
//! - No locks needed - all registry access goes through message passing
//!
//! # Example
//! ```ignore
//! use broadcast_chat::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let server = ChatServer::bind(&config).await.unwrap();
//!     server.run().await;
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod config;
pub mod duplex;
pub mod error;
pub mod handler;
pub mod identity;
pub mod lifecycle;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod types;

// Re-export main types for convenience
pub use broadcast::{BroadcastReport, Broadcaster};
pub use client::{ChatClient, LoginStream};
pub use config::{ClientArgs, ClientConfig, DuplicateLogin, MessageIdPolicy, ServerArgs, ServerConfig};
pub use error::{AppError, ClientError, PushError, RegistryError};
pub use handler::{handle_connection, HandlerContext};
pub use lifecycle::SessionState;
pub use message::{ClientRequest, ErrorCode, PushFrame, ServerResponse};
pub use registry::{Registry, RegistryCommand, RegistryHandle};
pub use server::ChatServer;
pub use session::{PushHandle, SessionEnd, SessionHandle, SessionTicket};
pub use types::{ChatMessage, SessionId, User, UserId};
