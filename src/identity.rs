//! Identity generation
//!
//! Ids are the hex-encoded SHA-256 of an RFC 3339 timestamp followed by a
//! seed string (the display name). Opaque to the server.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::types::{ChatMessage, User};

/// Hash a timestamp and a seed into an opaque hex id
pub fn digest_id(seed: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(at.to_rfc3339().as_bytes());
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create a new user with an id derived from the current time
pub fn new_user(display_name: &str) -> User {
    let id = digest_id(display_name, Utc::now());
    User::new(id, display_name)
}

/// Build an outgoing message stamped with the current time
pub fn new_message(sender: &User, id: String, body: impl Into<String>) -> ChatMessage {
    ChatMessage {
        id,
        sender: sender.clone(),
        body: body.into(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_digest_is_hex_sha256() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let id = digest_id("Alice", at);
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_digest_is_stable() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(digest_id("Alice", at), digest_id("Alice", at));
        assert_ne!(digest_id("Alice", at), digest_id("Bob", at));
    }

    #[test]
    fn test_new_user_keeps_name() {
        let user = new_user("Alice");
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.id.as_str().len(), 64);
    }
}
