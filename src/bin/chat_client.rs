//! Broadcast chat client - Entry Point
//!
//! Logs in, then runs the Receiver and Producer until both stop. SIGINT or
//! SIGTERM sends one Logout and exits immediately.

use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use broadcast_chat::duplex::{run_duplex, MessageFactory};
use broadcast_chat::shutdown::ShutdownSignal;
use broadcast_chat::{identity, ChatClient, ClientArgs, ClientConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries the chat
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("broadcast_chat=info,chat_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting client...");
    let config = ClientConfig::from(ClientArgs::parse());

    let user = identity::new_user(&config.name);
    info!("New User: name={}, id={}", user.display_name, user.id);

    // Startup failures are fatal
    let mut shutdown = ShutdownSignal::install()?;
    let client = ChatClient::connect(config.url()).await?;
    let stream = client.login(&user).await?;

    let factory = MessageFactory::new(user.clone(), config.message_ids);
    let input = BufReader::new(tokio::io::stdin());
    let driver = tokio::spawn(run_duplex(
        client.clone(),
        factory,
        stream,
        input,
        tokio::io::stdout(),
    ));

    info!("Start chatting!");

    tokio::select! {
        _ = shutdown.recv() => {
            if let Err(e) = client.logout(&user).await {
                error!("Error while cleaning up: {}", e);
            }
            std::process::exit(1);
        }
        outcome = driver => {
            match outcome {
                Ok(outcome) => info!("Chat ended: {:?}", outcome),
                Err(e) => error!("Duplex driver failed: {}", e),
            }
        }
    }

    Ok(())
}
