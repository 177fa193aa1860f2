//! Client duplex driver
//!
//! Runs the Receiver (server pushes → output) and the Producer (input lines
//! → SendMessage calls) as two independent tasks for one logged-in user.
//! The driver is done when both have stopped.

use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use crate::client::{ChatClient, LoginStream};
use crate::config::MessageIdPolicy;
use crate::error::ClientError;
use crate::identity;
use crate::types::{ChatMessage, User};

/// Builds outgoing messages for one user
#[derive(Debug, Clone)]
pub struct MessageFactory {
    user: User,
    policy: MessageIdPolicy,
    session_message_id: String,
    sent: u64,
}

impl MessageFactory {
    pub fn new(user: User, policy: MessageIdPolicy) -> Self {
        let session_message_id = identity::digest_id(&user.display_name, Utc::now());
        Self {
            user,
            policy,
            session_message_id,
            sent: 0,
        }
    }

    /// Next message carrying `body`
    pub fn next_message(&mut self, body: impl Into<String>) -> ChatMessage {
        self.sent += 1;
        let id = match self.policy {
            MessageIdPolicy::PerSession => self.session_message_id.clone(),
            MessageIdPolicy::PerMessage => {
                let seed = format!("{}#{}", self.user.display_name, self.sent);
                identity::digest_id(&seed, Utc::now())
            }
        };
        identity::new_message(&self.user, id, body)
    }
}

/// How each half of the driver stopped
#[derive(Debug)]
pub struct DuplexOutcome {
    pub receiver: Result<(), ClientError>,
    pub producer: Result<(), ClientError>,
}

/// Receiver: print every pushed message as `sender: body`
///
/// Runs until the stream errors or closes; always returns the reason.
pub async fn run_receiver<W>(mut stream: LoginStream, mut output: W) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let message = match stream.recv().await {
            Ok(message) => message,
            Err(e) => {
                warn!("Error while reading message: {}", e);
                return Err(e);
            }
        };

        let line = format!("{}\n", message.render());
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
}

/// Producer: send one message per input line
///
/// Returns Ok at end of input, or the first send failure.
pub async fn run_producer<R>(
    client: ChatClient,
    mut factory: MessageFactory,
    input: R,
) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let message = factory.next_message(line);
        if let Err(e) = client.send_message(&message).await {
            error!("Error sending message: {}", e);
            return Err(e);
        }
    }

    info!("Closing Producer");
    Ok(())
}

/// Run Receiver and Producer concurrently until both stop
pub async fn run_duplex<R, W>(
    client: ChatClient,
    factory: MessageFactory,
    stream: LoginStream,
    input: R,
    output: W,
) -> DuplexOutcome
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let receiver = tokio::spawn(run_receiver(stream, output));
    let producer = tokio::spawn(run_producer(client, factory, input));

    let (receiver, producer) = tokio::join!(receiver, producer);
    let outcome = DuplexOutcome {
        receiver: receiver.unwrap_or_else(|e| Err(std::io::Error::other(e).into())),
        producer: producer.unwrap_or_else(|e| Err(std::io::Error::other(e).into())),
    };

    info!(
        "Receiver stopped ({:?}), Producer stopped ({:?})",
        outcome.receiver, outcome.producer
    );
    outcome
}
