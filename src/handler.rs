//! WebSocket connection handler
//!
//! Every RPC arrives on its own WebSocket connection. The first text frame
//! is a `ClientRequest`; Login turns the connection into a long-lived push
//! stream, Logout and SendMessage answer with a single frame.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::broadcast::Broadcaster;
use crate::error::{AppError, PushError};
use crate::message::{ClientRequest, PushFrame, ServerResponse};
use crate::registry::RegistryHandle;
use crate::session::{push_channel, PushRequest, SessionEnd};
use crate::types::{ChatMessage, SessionId, User, UserId};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Everything a handler needs from the server, passed in at spawn time
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub registry: RegistryHandle,
    pub broadcaster: Broadcaster,
    pub push_buffer: usize,
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, reads one request and dispatches it.
pub async fn handle_connection(stream: TcpStream, ctx: HandlerContext) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let request = match read_request(&mut ws_receiver).await {
        Ok(request) => request,
        Err(AppError::NoRequest) => {
            debug!("Connection from {} closed without a request", peer_addr);
            return Ok(());
        }
        Err(e) => {
            warn!("Bad request from {}: {}", peer_addr, e);
            let _ = send_response(&mut ws_sender, &ServerResponse::from(e)).await;
            let _ = ws_sender.close().await;
            return Ok(());
        }
    };

    match request {
        ClientRequest::Login { user, active } => {
            handle_login(user, active, ws_sender, ws_receiver, &ctx).await
        }
        ClientRequest::Logout { user } => {
            let response = handle_logout(user, &ctx).await;
            reply_and_close(&mut ws_sender, &response).await
        }
        ClientRequest::SendMessage { message } => {
            let response = handle_send_message(message, &ctx).await;
            reply_and_close(&mut ws_sender, &response).await
        }
    }
}

/// Read frames until the first text frame and parse it as a request
async fn read_request(ws_receiver: &mut WsSource) -> Result<ClientRequest, AppError> {
    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result? {
            Message::Text(text) => return Ok(serde_json::from_str::<ClientRequest>(&text)?),
            Message::Close(_) => break,
            // Ping/Pong handled by tungstenite; binary ignored
            _ => {}
        }
    }
    Err(AppError::NoRequest)
}

async fn send_response<S, T>(ws_sender: &mut S, frame: &T) -> Result<(), AppError>
where
    S: Sink<Message, Error = WsError> + Unpin,
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string(frame)?;
    ws_sender.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Write one pushed message and report the outcome to its pusher
async fn deliver<S>(ws_sender: &mut S, request: PushRequest)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let frame = PushFrame::Message {
        message: &request.message,
    };
    let result = send_response(ws_sender, &frame)
        .await
        .map_err(|e| PushError::Transport(e.to_string()));
    request.complete(result);
}

async fn reply_and_close(ws_sender: &mut WsSink, response: &ServerResponse) -> Result<(), AppError> {
    send_response(ws_sender, response).await?;
    let _ = ws_sender.close().await;
    Ok(())
}

/// Long-lived Login call
///
/// Registers a session, then writes pushed messages to the socket until the
/// session's terminal signal fires. A peer that closes its side is evicted.
async fn handle_login(
    user: User,
    active: bool,
    mut ws_sender: WsSink,
    mut ws_receiver: WsSource,
    ctx: &HandlerContext,
) -> Result<(), AppError> {
    info!(
        "Received login request: userName={}, userID={}",
        user.display_name, user.id
    );

    if !active {
        let err = AppError::InvalidRequest("login requires an active connection".to_string());
        return reply_and_close(&mut ws_sender, &err.into()).await;
    }
    if user.id.is_empty() {
        let err = AppError::InvalidRequest("user id must not be empty".to_string());
        return reply_and_close(&mut ws_sender, &err.into()).await;
    }

    let (push, mut pushes) = push_channel(ctx.push_buffer);
    let mut ticket = match ctx.registry.register(user, push).await {
        Ok(ticket) => ticket,
        Err(e) => return reply_and_close(&mut ws_sender, &AppError::from(e).into()).await,
    };

    let user_id = ticket.user_id.clone();
    let session_id = ticket.session_id;

    // Queued pushes wait behind this frame
    let connected = ServerResponse::Connected { session_id };
    if let Err(e) = send_response(&mut ws_sender, &connected).await {
        warn!("Could not confirm login for {}: {}", user_id, e);
        evict(ctx, &user_id, session_id, PushError::Transport(e.to_string())).await;
    }

    let mut peer_open = true;
    let end = loop {
        tokio::select! {
            end = ticket.ended() => break end,
            Some(request) = pushes.next() => deliver(&mut ws_sender, request).await,
            incoming = ws_receiver.next(), if peer_open => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client {} closed its login stream", user_id);
                        peer_open = false;
                        evict(ctx, &user_id, session_id, PushError::PeerClosed).await;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", user_id, e);
                        peer_open = false;
                        evict(ctx, &user_id, session_id, PushError::Transport(e.to_string())).await;
                    }
                    Some(Ok(_)) => {
                        // Login stream is push-only
                    }
                }
            }
        }
    };

    match &end {
        SessionEnd::LoggedOut => info!("{} logged out", user_id),
        SessionEnd::Failed(reason) => warn!("Session for {} failed: {}", user_id, reason),
        SessionEnd::Abandoned => info!("Session {} for {} abandoned", session_id, user_id),
    }

    // Refuse anything still queued so pushers don't wait on us
    drop(pushes);
    let _ = ws_sender.close().await;

    match end {
        SessionEnd::Failed(reason) => Err(AppError::Push(reason)),
        SessionEnd::LoggedOut | SessionEnd::Abandoned => Ok(()),
    }
}

async fn evict(ctx: &HandlerContext, user_id: &UserId, session_id: SessionId, reason: PushError) {
    if let Err(e) = ctx.registry.evict(user_id, session_id, reason).await {
        error!("Could not evict {}: {}", user_id, e);
    }
}

async fn handle_logout(user: User, ctx: &HandlerContext) -> ServerResponse {
    info!(
        "Received logout request: userName={}, userID={}",
        user.display_name, user.id
    );

    match ctx.registry.unregister(&user.id).await {
        Ok(()) => ServerResponse::Receipt,
        Err(e) => AppError::from(e).into(),
    }
}

async fn handle_send_message(message: ChatMessage, ctx: &HandlerContext) -> ServerResponse {
    if message.sender.id.is_empty() {
        return AppError::InvalidRequest("message sender id must not be empty".to_string()).into();
    }

    debug!("Received message {} from {}", message.id, message.sender.id);
    let report = ctx.broadcaster.broadcast(message).await;
    if report.failed > 0 {
        info!("Broadcast evicted {} sessions", report.failed);
    }
    ServerResponse::Receipt
}
