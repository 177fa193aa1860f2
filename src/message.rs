//! Message protocol definitions
//!
//! JSON-based protocol using Serde's tagged enum for type-safe
//! serialization/deserialization. Every RPC is one WebSocket connection
//! whose first client frame is a `ClientRequest`.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, RegistryError};
use crate::types::{ChatMessage, SessionId, User};

/// Client → Server request
///
/// All calls from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Open the long-lived push stream for a user
    Login { user: User, active: bool },
    /// End a user's session
    Logout { user: User },
    /// Broadcast a message to every session
    SendMessage { message: ChatMessage },
}

/// Server → Client frame
///
/// All frames from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    /// Login accepted, session registered
    Connected { session_id: SessionId },
    /// Pushed chat message
    Message { message: ChatMessage },
    /// Empty receipt for a unary call
    Receipt,
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Borrowed form of `ServerResponse::Message` for the push path
///
/// Serializes to the same frame without cloning the message per recipient.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame<'a> {
    Message { message: &'a ChatMessage },
}

/// Error codes for ServerResponse::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Logout for a user id that is not registered
    NotFound,
    /// Login for a user id that is already registered (reject policy)
    AlreadyLoggedIn,
    /// Malformed or unacceptable request
    InvalidRequest,
    /// Anything else
    Internal,
}

/// Convert AppError to ServerResponse for client notification
impl From<AppError> for ServerResponse {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::Registry(RegistryError::NotFound(user_id)) => {
                (ErrorCode::NotFound, format!("user not found: userID={}", user_id))
            }
            AppError::Registry(RegistryError::AlreadyLoggedIn(user_id)) => (
                ErrorCode::AlreadyLoggedIn,
                format!("user already logged in: userID={}", user_id),
            ),
            AppError::InvalidRequest(reason) => (ErrorCode::InvalidRequest, reason.clone()),
            AppError::Json(e) => {
                (ErrorCode::InvalidRequest, format!("Invalid message format: {}", e))
            }
            _ => (ErrorCode::Internal, "Internal error".to_string()),
        };
        ServerResponse::Error { code, message }
    }
}
