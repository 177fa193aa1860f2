//! Configuration for the server and the client
//!
//! Command line arguments are parsed with clap into `ServerArgs` /
//! `ClientArgs` and converted into the plain config structs the library uses.

use clap::Parser;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:50051";

/// Channel buffer size for registry commands
pub const COMMAND_BUFFER_SIZE: usize = 256;

/// Channel buffer size for each session's push queue
pub const PUSH_BUFFER_SIZE: usize = 32;

/// What the registry does when a user id logs in twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateLogin {
    /// Overwrite the earlier entry; its Login call is abandoned
    #[default]
    Replace,
    /// Refuse the second Login with `already_logged_in`
    Reject,
}

/// How the client assigns message ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageIdPolicy {
    /// One id generated at startup, reused for every message
    #[default]
    PerSession,
    /// A fresh id for every message
    PerMessage,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind
    pub addr: String,
    /// Deliver a message back to its sender's own session
    pub self_delivery: bool,
    pub duplicate_login: DuplicateLogin,
    pub push_buffer: usize,
    pub command_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            self_delivery: true,
            duplicate_login: DuplicateLogin::default(),
            push_buffer: PUSH_BUFFER_SIZE,
            command_buffer: COMMAND_BUFFER_SIZE,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address as `host:port`
    pub server_addr: String,
    /// Display name
    pub name: String,
    pub message_ids: MessageIdPolicy,
}

impl ClientConfig {
    /// WebSocket URL of the server
    pub fn url(&self) -> String {
        server_url(&self.server_addr)
    }
}

/// Turn `host:port` into a `ws://` URL, leaving explicit URLs alone
pub fn server_url(addr: &str) -> String {
    if addr.starts_with("ws://") || addr.starts_with("wss://") {
        addr.to_string()
    } else {
        format!("ws://{}", addr)
    }
}

/// Chat server command line
#[derive(Parser, Debug)]
#[command(author, version, about = "Broadcast chat server", long_about = None)]
pub struct ServerArgs {
    /// Socket address to bind to
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub address: String,

    /// Do not deliver messages back to their sender
    #[arg(long)]
    pub no_self_delivery: bool,

    /// Refuse a login whose user id is already connected
    #[arg(long)]
    pub reject_duplicate_logins: bool,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            addr: args.address,
            self_delivery: !args.no_self_delivery,
            duplicate_login: if args.reject_duplicate_logins {
                DuplicateLogin::Reject
            } else {
                DuplicateLogin::Replace
            },
            ..Self::default()
        }
    }
}

/// Chat client command line
#[derive(Parser, Debug)]
#[command(author, version, about = "Broadcast chat client", long_about = None)]
pub struct ClientArgs {
    /// Display name
    #[arg(long, default_value = "Anonymous")]
    pub name: String,

    /// Server address
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub address: String,

    /// Generate a fresh id for every message instead of one per session
    #[arg(long)]
    pub unique_message_ids: bool,
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        Self {
            server_addr: args.address,
            name: args.name,
            message_ids: if args.unique_message_ids {
                MessageIdPolicy::PerMessage
            } else {
                MessageIdPolicy::PerSession
            },
        }
    }
}
