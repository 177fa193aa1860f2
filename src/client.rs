//! Chat client RPC stubs
//!
//! `ChatClient` opens one WebSocket per call: `login` keeps its connection
//! as the inbound push stream, `logout` and `send_message` wait for a single
//! reply frame and close.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::ClientError;
use crate::message::{ClientRequest, ErrorCode, ServerResponse};
use crate::types::{ChatMessage, SessionId, User};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client for one chat server
#[derive(Debug, Clone)]
pub struct ChatClient {
    url: String,
}

impl ChatClient {
    /// Client for `url` without checking reachability
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Check the server is reachable and return a client for it
    pub async fn connect(url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Self::new(url);
        info!("Connecting to server at {}...", client.url);

        let mut probe = client.open().await?;
        let _ = probe.close(None).await;

        info!("Connected to server at {}", client.url);
        Ok(client)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&self) -> Result<WsStream, ClientError> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|source| ClientError::Connect {
                url: self.url.clone(),
                source,
            })?;
        Ok(ws_stream)
    }

    /// Open the push stream for `user`
    ///
    /// Returns once the server has registered the session.
    pub async fn login(&self, user: &User) -> Result<LoginStream, ClientError> {
        debug!("Creating stream for user: {}", user.id);
        let mut ws_stream = self
            .open()
            .await
            .map_err(|e| ClientError::Login(e.to_string()))?;

        let request = ClientRequest::Login {
            user: user.clone(),
            active: true,
        };
        send_request(&mut ws_stream, &request)
            .await
            .map_err(|e| ClientError::Login(e.to_string()))?;

        match next_response(&mut ws_stream).await {
            Ok(ServerResponse::Connected { session_id }) => {
                info!("Created stream, session {}", session_id);
                Ok(LoginStream {
                    session_id,
                    ws_stream,
                })
            }
            Ok(ServerResponse::Error { code, message }) => {
                Err(ClientError::Login(format!("{:?}: {}", code, message)))
            }
            Ok(other) => Err(ClientError::Login(format!("unexpected reply {:?}", other))),
            Err(e) => Err(ClientError::Login(e.to_string())),
        }
    }

    /// End `user`'s session on the server
    pub async fn logout(&self, user: &User) -> Result<(), ClientError> {
        info!("Logging {} out...", user.display_name);
        self.call(&ClientRequest::Logout { user: user.clone() })
            .await?;
        info!("{} logged out", user.display_name);
        Ok(())
    }

    /// Broadcast a message; returns after the server's fan-out has finished
    pub async fn send_message(&self, message: &ChatMessage) -> Result<(), ClientError> {
        let request = ClientRequest::SendMessage {
            message: message.clone(),
        };
        self.call(&request)
            .await
            .map_err(|e| ClientError::Send(e.to_string()))
    }

    /// Unary call: one request, one receipt
    async fn call(&self, request: &ClientRequest) -> Result<(), ClientError> {
        let mut ws_stream = self.open().await?;
        send_request(&mut ws_stream, request).await?;
        let response = next_response(&mut ws_stream).await;
        let _ = ws_stream.close(None).await;

        match response? {
            ServerResponse::Receipt => Ok(()),
            ServerResponse::Error {
                code: ErrorCode::NotFound,
                message,
            } => Err(ClientError::NotFound(message)),
            ServerResponse::Error { code, message } => Err(ClientError::Rejected { code, message }),
            other => Err(ClientError::UnexpectedFrame(format!("{:?}", other))),
        }
    }
}

/// The inbound half of a logged-in session
pub struct LoginStream {
    session_id: SessionId,
    ws_stream: WsStream,
}

impl LoginStream {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Wait for the next pushed message
    ///
    /// A clean close from the server is reported as `StreamClosed`.
    pub async fn recv(&mut self) -> Result<ChatMessage, ClientError> {
        match next_response(&mut self.ws_stream).await? {
            ServerResponse::Message { message } => Ok(message),
            ServerResponse::Error { code, message } => Err(ClientError::Rejected { code, message }),
            other => Err(ClientError::UnexpectedFrame(format!("{:?}", other))),
        }
    }

    /// Close the stream from the client side
    pub async fn close(mut self) {
        let _ = self.ws_stream.close(None).await;
    }
}

async fn send_request(ws_stream: &mut WsStream, request: &ClientRequest) -> Result<(), ClientError> {
    let json = serde_json::to_string(request)?;
    ws_stream.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Read frames until the next text frame and parse it
async fn next_response(ws_stream: &mut WsStream) -> Result<ServerResponse, ClientError> {
    while let Some(msg_result) = ws_stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => return Ok(serde_json::from_str::<ServerResponse>(&text)?),
            Ok(Message::Close(_)) => return Err(ClientError::StreamClosed),
            Ok(_) => {}
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => {
                return Err(ClientError::StreamClosed)
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ClientError::StreamClosed)
}
