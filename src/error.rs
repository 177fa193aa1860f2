//! Error types for the chat service
//!
//! Server-side handler errors, registry and push failures, and the
//! client-side taxonomy. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::message::ErrorCode;
use crate::types::UserId;

/// Server-side application errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (sent back to the caller as an error frame).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry rejected or could not process the operation
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Session ended because a push to it failed
    #[error("Push failed: {0}")]
    Push(PushError),

    /// Request was well-formed JSON but not acceptable
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connection closed before a request arrived
    #[error("Connection closed before request")]
    NoRequest,
}

/// Connection registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No session registered under this user id
    #[error("User not found: {0}")]
    NotFound(UserId),

    /// A session is already registered and duplicates are rejected
    #[error("User already logged in: {0}")]
    AlreadyLoggedIn(UserId),

    /// The registry actor has stopped
    #[error("Registry closed")]
    Closed,
}

/// A single push attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// The session's writer is gone
    #[error("Push channel closed")]
    Closed,

    /// The peer closed its end of the stream
    #[error("Peer closed the stream")]
    PeerClosed,

    /// The transport rejected the write
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Client-side errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Cannot reach the server (fatal at startup)
    #[error("Failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    /// Login stream could not be established (fatal)
    #[error("Login failed: {0}")]
    Login(String),

    /// Outgoing message could not be delivered to the server
    #[error("Send failed: {0}")]
    Send(String),

    /// Inbound push stream ended
    #[error("Stream closed")]
    StreamClosed,

    /// Logout for a user the server does not know
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server answered with an error frame
    #[error("Server rejected request ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },

    /// Server answered with a frame that does not fit the call
    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
