//! Connection registry actor
//!
//! The single owner of the session table. Handlers and the broadcast engine
//! talk to it through `RegistryHandle`, which sends `RegistryCommand`s over an
//! mpsc channel. Commands are processed one at a time, so register,
//! unregister, evict and snapshot never interleave.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::DuplicateLogin;
use crate::error::{PushError, RegistryError};
use crate::session::{PushHandle, Session, SessionEnd, SessionHandle, SessionTicket};
use crate::types::{SessionId, User, UserId};

/// Commands sent from handlers and the broadcast engine to the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Insert a session for a user
    Register {
        user: User,
        push: PushHandle,
        reply: oneshot::Sender<Result<SessionTicket, RegistryError>>,
    },
    /// Remove a user's session (Logout)
    Unregister {
        user_id: UserId,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    /// Remove one specific session after a delivery failure
    Evict {
        user_id: UserId,
        session_id: SessionId,
        reason: PushError,
        reply: oneshot::Sender<bool>,
    },
    /// Point-in-time view of all active sessions
    Snapshot {
        reply: oneshot::Sender<Vec<SessionHandle>>,
    },
}

/// The registry actor
///
/// Uses a HashMap keyed by user id for O(1) register and unregister.
pub struct Registry {
    /// Active sessions: UserId -> Session
    sessions: HashMap<UserId, Session>,
    /// What to do when a user id is already registered
    duplicate_login: DuplicateLogin,
    /// Command receiver channel
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl Registry {
    /// Create a new Registry with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, duplicate_login: DuplicateLogin) -> Self {
        Self {
            sessions: HashMap::new(),
            duplicate_login,
            receiver,
        }
    }

    /// Spawn a registry actor and return a handle to it
    pub fn spawn(buffer: usize, duplicate_login: DuplicateLogin) -> RegistryHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(buffer);
        tokio::spawn(Registry::new(cmd_rx, duplicate_login).run());
        RegistryHandle::new(cmd_tx)
    }

    /// Run the registry event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("Registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            "Registry shutting down, abandoning {} sessions",
            self.sessions.len()
        );
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register { user, push, reply } => {
                let _ = reply.send(self.handle_register(user, push));
            }
            RegistryCommand::Unregister { user_id, reply } => {
                let _ = reply.send(self.handle_unregister(user_id));
            }
            RegistryCommand::Evict {
                user_id,
                session_id,
                reason,
                reply,
            } => {
                let _ = reply.send(self.handle_evict(user_id, session_id, reason));
            }
            RegistryCommand::Snapshot { reply } => {
                let _ = reply.send(self.handle_snapshot());
            }
        }
    }

    fn handle_register(
        &mut self,
        user: User,
        push: PushHandle,
    ) -> Result<SessionTicket, RegistryError> {
        if self.sessions.contains_key(&user.id) && self.duplicate_login == DuplicateLogin::Reject {
            warn!("Rejecting duplicate login for {}", user.id);
            return Err(RegistryError::AlreadyLoggedIn(user.id));
        }

        let user_id = user.id.clone();
        let (session, ticket) = Session::open(user, push);
        debug!("Session {} for {} is {}", session.session_id, user_id, session.state);

        if let Some(previous) = self.sessions.insert(user_id.clone(), session) {
            // Abandoned, not closed: dropping it releases its completion slot
            warn!(
                "Session {} for {} replaced by a new login",
                previous.session_id, user_id
            );
        }

        if let Some(session) = self.sessions.get_mut(&user_id) {
            if let Err(e) = session.activate() {
                warn!("Session {} for {}: {}", session.session_id, user_id, e);
            }
            info!(
                "Session {} for {} ({}) is {}",
                session.session_id, user_id, session.user.display_name, session.state
            );
        }

        debug!("Total sessions: {}", self.sessions.len());
        Ok(ticket)
    }

    fn handle_unregister(&mut self, user_id: UserId) -> Result<(), RegistryError> {
        let Some(mut session) = self.sessions.remove(&user_id) else {
            warn!("Logout for unknown user {}", user_id);
            return Err(RegistryError::NotFound(user_id));
        };

        session.begin_close(SessionEnd::LoggedOut);
        session.mark_closed();
        info!("Session {} for {} is {}", session.session_id, user_id, session.state);
        debug!("Total sessions: {}", self.sessions.len());
        Ok(())
    }

    fn handle_evict(&mut self, user_id: UserId, session_id: SessionId, reason: PushError) -> bool {
        let current = self
            .sessions
            .get(&user_id)
            .is_some_and(|s| s.session_id == session_id);
        if !current {
            debug!("Stale eviction of session {} for {} ignored", session_id, user_id);
            return false;
        }

        let Some(mut session) = self.sessions.remove(&user_id) else {
            return false;
        };

        warn!("Evicting session {} for {}: {}", session_id, user_id, reason);
        session.begin_close(SessionEnd::Failed(reason));
        session.mark_closed();
        info!("Session {} for {} is {}", session_id, user_id, session.state);
        debug!("Total sessions: {}", self.sessions.len());
        true
    }

    fn handle_snapshot(&self) -> Vec<SessionHandle> {
        self.sessions
            .values()
            .filter(|s| s.state.is_deliverable())
            .map(Session::handle)
            .collect()
    }
}

/// Cloneable handle to the registry actor
///
/// Passed into every connection handler and the broadcast engine.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(make(reply))
            .await
            .map_err(|_| RegistryError::Closed)?;
        response.await.map_err(|_| RegistryError::Closed)
    }

    /// Register a session; the ticket resolves when the session ends
    pub async fn register(&self, user: User, push: PushHandle) -> Result<SessionTicket, RegistryError> {
        self.request(|reply| RegistryCommand::Register { user, push, reply })
            .await?
    }

    /// Remove a user's session, failing with `NotFound` if absent
    pub async fn unregister(&self, user_id: &UserId) -> Result<(), RegistryError> {
        let user_id = user_id.clone();
        self.request(|reply| RegistryCommand::Unregister { user_id, reply })
            .await?
    }

    /// Evict a specific session; returns false if it was already gone or replaced
    pub async fn evict(
        &self,
        user_id: &UserId,
        session_id: SessionId,
        reason: PushError,
    ) -> Result<bool, RegistryError> {
        let user_id = user_id.clone();
        self.request(|reply| RegistryCommand::Evict {
            user_id,
            session_id,
            reason,
            reply,
        })
        .await
    }

    /// Point-in-time view of all active sessions
    pub async fn snapshot(&self) -> Result<Vec<SessionHandle>, RegistryError> {
        self.request(|reply| RegistryCommand::Snapshot { reply }).await
    }
}
