//! Broadcast engine
//!
//! Fans one message out to every session in a registry snapshot, one task per
//! recipient, and waits for all of them. A failed push evicts that recipient
//! only; the rest of the broadcast carries on.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::registry::RegistryHandle;
use crate::types::ChatMessage;

/// Outcome counts of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Pushes that reached the session's writer and succeeded
    pub delivered: usize,
    /// Pushes that failed; those sessions were evicted
    pub failed: usize,
    /// Sessions left out (the sender itself when self-delivery is off)
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: RegistryHandle,
    self_delivery: bool,
}

impl Broadcaster {
    pub fn new(registry: RegistryHandle, self_delivery: bool) -> Self {
        Self {
            registry,
            self_delivery,
        }
    }

    /// Deliver `message` to every active session
    ///
    /// Returns once every delivery attempt has finished.
    pub async fn broadcast(&self, message: ChatMessage) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let sessions = match self.registry.snapshot().await {
            Ok(sessions) => sessions,
            Err(e) => {
                error!("Dropping message {}: {}", message.id, e);
                return report;
            }
        };

        let message = Arc::new(message);
        let mut deliveries = JoinSet::new();

        for session in sessions {
            if !self.self_delivery && session.user_id == message.sender.id {
                report.skipped += 1;
                continue;
            }

            let message = Arc::clone(&message);
            deliveries.spawn(async move {
                debug!("Sending message {} to user {}", message.id, session.user_id);
                let result = session.push.push(message).await;
                (session, result)
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            let (session, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Delivery task for message {} failed: {}", message.id, e);
                    report.failed += 1;
                    continue;
                }
            };

            match result {
                Ok(()) => report.delivered += 1,
                Err(reason) => {
                    report.failed += 1;
                    warn!("Error with stream {}: {}", session.user_id, reason);
                    if let Err(e) = self
                        .registry
                        .evict(&session.user_id, session.session_id, reason)
                        .await
                    {
                        error!("Could not evict {}: {}", session.user_id, e);
                    }
                }
            }
        }

        debug!(
            "Message {} from {}: {:?}",
            message.id, message.sender.id, report
        );
        report
    }
}
