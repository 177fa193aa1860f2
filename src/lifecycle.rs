//! Session lifecycle state machine
//!
//! `Connecting → Active → Closing → Closed`. Transitions are checked;
//! anything else is rejected and leaves the state untouched.

use thiserror::Error;

/// State of a single server-side session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Login received, not yet registered
    Connecting,
    /// Registered and eligible for broadcast
    Active,
    /// Logout received or push failed
    Closing,
    /// Removed from the registry
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

impl SessionState {
    /// Check whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Connecting, SessionState::Active)
                | (SessionState::Active, SessionState::Closing)
                | (SessionState::Closing, SessionState::Closed)
        )
    }

    /// Move to `next`, or fail without changing state
    pub fn transition(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if !self.can_transition_to(next) {
            return Err(InvalidTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }

    /// Only active sessions appear in broadcast snapshots
    pub fn is_deliverable(self) -> bool {
        self == SessionState::Active
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
