//! Server-side session definitions
//!
//! A session is one user's registered, deliverable connection. It owns a
//! push handle (the sending side of the connection's writer queue) and a
//! one-shot completion slot that the blocked Login call waits on.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::PushError;
use crate::lifecycle::{InvalidTransition, SessionState};
use crate::types::{ChatMessage, SessionId, User, UserId};

/// One pending delivery: the message plus the slot its outcome goes to
#[derive(Debug)]
pub struct PushRequest {
    pub message: Arc<ChatMessage>,
    ack: oneshot::Sender<Result<(), PushError>>,
}

impl PushRequest {
    /// Report the outcome of the write back to the pusher
    pub fn complete(self, result: Result<(), PushError>) {
        // Pusher may have given up; nothing to report to then
        let _ = self.ack.send(result);
    }
}

/// Sending side of a session's push queue
///
/// Cloned into broadcast snapshots. Every clone feeds the same single writer,
/// so writes to one transport sink never overlap.
#[derive(Debug, Clone)]
pub struct PushHandle {
    sender: mpsc::Sender<PushRequest>,
}

/// Receiving side of a session's push queue, drained by the connection writer
#[derive(Debug)]
pub struct PushReceiver {
    receiver: mpsc::Receiver<PushRequest>,
}

/// Create a push queue with the given buffer size
pub fn push_channel(buffer: usize) -> (PushHandle, PushReceiver) {
    let (sender, receiver) = mpsc::channel(buffer);
    (PushHandle { sender }, PushReceiver { receiver })
}

impl PushHandle {
    /// Push a message and wait until the writer has attempted it
    ///
    /// Returns an error if the writer is gone or the transport write failed.
    pub async fn push(&self, message: Arc<ChatMessage>) -> Result<(), PushError> {
        let (ack, outcome) = oneshot::channel();
        self.sender
            .send(PushRequest { message, ack })
            .await
            .map_err(|_| PushError::Closed)?;
        outcome.await.map_err(|_| PushError::Closed)?
    }

    /// Check if the writer side has been dropped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl PushReceiver {
    /// Next delivery to write, or None once every handle is dropped
    pub async fn next(&mut self) -> Option<PushRequest> {
        self.receiver.recv().await
    }
}

/// Why a session ended, delivered once to its Login call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Explicit Logout
    LoggedOut,
    /// Push or connection failure; session evicted
    Failed(PushError),
    /// Completion slot dropped without a signal (replaced, or registry stopped)
    Abandoned,
}

/// Snapshot view of an active session, handed to the broadcast engine
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub push: PushHandle,
}

/// What the Login handler holds while its session is registered
#[derive(Debug)]
pub struct SessionTicket {
    pub user_id: UserId,
    pub session_id: SessionId,
    ended: oneshot::Receiver<SessionEnd>,
}

impl SessionTicket {
    /// Wait for the session's terminal signal
    ///
    /// Cancel safe; must not be awaited again once it has returned.
    pub async fn ended(&mut self) -> SessionEnd {
        (&mut self.ended).await.unwrap_or(SessionEnd::Abandoned)
    }
}

/// Registry entry for one connected user
///
/// Owned exclusively by the registry.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub session_id: SessionId,
    pub push: PushHandle,
    pub state: SessionState,
    completion: Option<oneshot::Sender<SessionEnd>>,
}

impl Session {
    /// Create a connecting session and the ticket its Login call waits on
    ///
    /// Not deliverable until `activate` is called.
    pub fn open(user: User, push: PushHandle) -> (Self, SessionTicket) {
        let session_id = SessionId::new();
        let (completion, ended) = oneshot::channel();

        let ticket = SessionTicket {
            user_id: user.id.clone(),
            session_id,
            ended,
        };
        let session = Self {
            user,
            session_id,
            push,
            state: SessionState::Connecting,
            completion: Some(completion),
        };
        (session, ticket)
    }

    /// Mark the session eligible for broadcast once it is registered
    pub fn activate(&mut self) -> Result<(), InvalidTransition> {
        self.state.transition(SessionState::Active)
    }

    /// Snapshot handle for broadcasting
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            user_id: self.user.id.clone(),
            session_id: self.session_id,
            push: self.push.clone(),
        }
    }

    /// Mark Closing and fire the completion slot
    ///
    /// The caller removes the session from the registry and then calls
    /// `mark_closed` before anything else can observe the registry.
    pub fn begin_close(&mut self, end: SessionEnd) {
        if let Err(e) = self.state.transition(SessionState::Closing) {
            warn!("Session {} for {}: {}", self.session_id, self.user.id, e);
            return;
        }
        debug!("Session {} for {} is {}", self.session_id, self.user.id, self.state);

        if let Some(completion) = self.completion.take() {
            if completion.send(end).is_err() {
                debug!("Login call for {} already gone", self.user.id);
            }
        }
    }

    /// Record removal from the registry
    pub fn mark_closed(&mut self) {
        if let Err(e) = self.state.transition(SessionState::Closed) {
            warn!("Session {} for {}: {}", self.session_id, self.user.id, e);
        }
    }
}
