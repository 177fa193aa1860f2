//! Basic type definitions for the chat service
//!
//! Provides newtype wrappers for type safety:
//! - `UserId`: opaque user identifier chosen by the client
//! - `SessionId`: UUID-based identifier of one registration
//!
//! and the two immutable values that travel on the wire: `User` and `ChatMessage`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque user identifier (newtype pattern)
///
/// Keys the connection registry. Not deduplicated: two logins with the
/// same id address the same registry slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a single registration
///
/// A user id can be registered many times over the life of the server;
/// the session id tells those registrations apart so that a late eviction
/// never removes a newer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            display_name: display_name.into(),
        }
    }
}

/// A chat message
///
/// Created by the sender's producer and fanned out read-only to every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: User,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Render the message the way clients print it: `sender: body`
    pub fn render(&self) -> String {
        format!("{}: {}", self.sender.display_name, self.body)
    }
}
