//! End-to-end tests: a real server on an ephemeral port with real clients.

use std::io::Cursor;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use broadcast_chat::duplex::{run_duplex, run_producer, MessageFactory};
use broadcast_chat::session::push_channel;
use broadcast_chat::{
    handle_connection, identity, AppError, Broadcaster, ChatClient, ChatServer, ClientError,
    ClientRequest, DuplicateLogin, ErrorCode, HandlerContext, MessageIdPolicy, PushError, Registry,
    RegistryHandle, ServerConfig, ServerResponse, SessionEnd, User,
};

const WAIT: Duration = Duration::from_secs(5);

async fn start_server(config: ServerConfig) -> (ChatClient, RegistryHandle) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = ChatServer::with_listener(listener, &config);
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    tokio::spawn(server.run());

    let client = ChatClient::connect(format!("ws://{}", addr)).await.unwrap();
    (client, registry)
}

async fn active_users(registry: &RegistryHandle) -> Vec<String> {
    let mut ids: Vec<String> = registry
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.user_id.to_string())
        .collect();
    ids.sort();
    ids
}

/// Send one raw text frame on a fresh connection and return the first reply
async fn raw_call(url: &str, frame: &str) -> ServerResponse {
    let (mut ws, _) = connect_async(url).await.unwrap();
    ws.send(Message::Text(frame.to_string())).await.unwrap();
    loop {
        match timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

fn assert_invalid_request(response: ServerResponse) {
    match response {
        ServerResponse::Error { code, .. } => assert_eq!(code, ErrorCode::InvalidRequest),
        other => panic!("expected invalid_request, got {:?}", other),
    }
}

#[tokio::test]
async fn test_send_logout_send() {
    let (client, registry) = start_server(ServerConfig::default()).await;
    let alice = User::new("a", "A");
    let bob = User::new("b", "B");

    let mut stream_a = client.login(&alice).await.unwrap();
    let mut stream_b = client.login(&bob).await.unwrap();
    assert_eq!(active_users(&registry).await, vec!["a", "b"]);

    let hi = identity::new_message(&alice, "m1".to_string(), "hi");
    client.send_message(&hi).await.unwrap();

    let received = timeout(WAIT, stream_b.recv()).await.unwrap().unwrap();
    assert_eq!(received.render(), "A: hi");
    // Self-delivery is on by default
    let echoed = timeout(WAIT, stream_a.recv()).await.unwrap().unwrap();
    assert_eq!(echoed.render(), "A: hi");

    client.logout(&bob).await.unwrap();
    let closed = timeout(WAIT, stream_b.recv()).await.unwrap();
    assert!(matches!(closed, Err(ClientError::StreamClosed)));
    assert_eq!(active_users(&registry).await, vec!["a"]);

    let still = identity::new_message(&alice, "m1".to_string(), "still here");
    client.send_message(&still).await.unwrap();
    let received = timeout(WAIT, stream_a.recv()).await.unwrap().unwrap();
    assert_eq!(received.body, "still here");
}

#[tokio::test]
async fn test_no_self_delivery() {
    let config = ServerConfig {
        self_delivery: false,
        ..ServerConfig::default()
    };
    let (client, _registry) = start_server(config).await;
    let alice = User::new("a", "A");
    let bob = User::new("b", "B");

    let mut stream_a = client.login(&alice).await.unwrap();
    let mut stream_b = client.login(&bob).await.unwrap();

    let first = identity::new_message(&alice, "m1".to_string(), "from a");
    client.send_message(&first).await.unwrap();
    let second = identity::new_message(&bob, "m2".to_string(), "from b");
    client.send_message(&second).await.unwrap();

    // Each side only sees the other's message
    let at_b = timeout(WAIT, stream_b.recv()).await.unwrap().unwrap();
    assert_eq!(at_b.body, "from a");
    let at_a = timeout(WAIT, stream_a.recv()).await.unwrap().unwrap();
    assert_eq!(at_a.body, "from b");
}

#[tokio::test]
async fn test_logout_unknown_user_is_not_found() {
    let (client, registry) = start_server(ServerConfig::default()).await;
    let alice = User::new("a", "A");
    let _stream_a = client.login(&alice).await.unwrap();

    let err = client.logout(&User::new("ghost", "Ghost")).await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));
    assert_eq!(active_users(&registry).await, vec!["a"]);
}

#[tokio::test]
async fn test_duplicate_login_rejected() {
    let config = ServerConfig {
        duplicate_login: DuplicateLogin::Reject,
        ..ServerConfig::default()
    };
    let (client, _registry) = start_server(config).await;
    let alice = User::new("a", "A");

    let _first = client.login(&alice).await.unwrap();
    let second = client.login(&alice).await;
    assert!(matches!(second, Err(ClientError::Login(_))));
}

#[tokio::test]
async fn test_duplicate_login_replaces_earlier_stream() {
    let (client, registry) = start_server(ServerConfig::default()).await;
    let alice = User::new("a", "A");

    let mut first = client.login(&alice).await.unwrap();
    let second = client.login(&alice).await.unwrap();
    assert_ne!(first.session_id(), second.session_id());

    // The abandoned Login call returns, ending the earlier stream
    let closed = timeout(WAIT, first.recv()).await.unwrap();
    assert!(matches!(closed, Err(ClientError::StreamClosed)));

    let snapshot = registry.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].session_id, second.session_id());
}

#[tokio::test]
async fn test_broken_push_handle_is_evicted() {
    let (client, registry) = start_server(ServerConfig::default()).await;
    let bob = User::new("b", "B");
    let mut stream_b = client.login(&bob).await.unwrap();

    // A session whose writer is gone
    let (push, pushes) = push_channel(4);
    drop(pushes);
    let mut ticket_a = registry.register(User::new("a", "A"), push).await.unwrap();

    let msg = identity::new_message(&bob, "m1".to_string(), "anyone there?");
    client.send_message(&msg).await.unwrap();

    let received = timeout(WAIT, stream_b.recv()).await.unwrap().unwrap();
    assert_eq!(received.body, "anyone there?");
    let end = timeout(WAIT, ticket_a.ended()).await.unwrap();
    assert_eq!(end, SessionEnd::Failed(PushError::Closed));
    assert_eq!(active_users(&registry).await, vec!["b"]);
}

#[tokio::test]
async fn test_broken_login_connection_fails_its_handler() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let registry = Registry::spawn(16, DuplicateLogin::Replace);
    let ctx = HandlerContext {
        registry: registry.clone(),
        broadcaster: Broadcaster::new(registry.clone(), true),
        push_buffer: 16,
    };

    // Drive A's connection handler directly so its result can be observed
    let connecting = tokio::spawn(connect_async(url.clone()));
    let (tcp, _) = listener.accept().await.unwrap();
    let handler_a = tokio::spawn(handle_connection(tcp, ctx.clone()));
    let (mut ws_a, _) = connecting.await.unwrap().unwrap();

    let login = ClientRequest::Login {
        user: User::new("a", "A"),
        active: true,
    };
    ws_a.send(Message::Text(serde_json::to_string(&login).unwrap()))
        .await
        .unwrap();
    let reply = timeout(WAIT, ws_a.next()).await.unwrap().unwrap().unwrap();
    let Message::Text(text) = reply else {
        panic!("expected a text frame, got {:?}", reply);
    };
    assert!(matches!(
        serde_json::from_str::<ServerResponse>(&text).unwrap(),
        ServerResponse::Connected { .. }
    ));

    let accept_ctx = ctx.clone();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(handle_connection(tcp, accept_ctx.clone()));
        }
    });

    let client = ChatClient::new(url);
    let bob = User::new("b", "B");
    let mut stream_b = client.login(&bob).await.unwrap();
    assert_eq!(active_users(&registry).await, vec!["a", "b"]);

    // Drop A's socket without a close handshake
    drop(ws_a);

    let msg = identity::new_message(&bob, "m1".to_string(), "still there?");
    client.send_message(&msg).await.unwrap();
    let received = timeout(WAIT, stream_b.recv()).await.unwrap().unwrap();
    assert_eq!(received.body, "still there?");

    let result = timeout(WAIT, handler_a).await.unwrap().unwrap();
    assert!(matches!(result, Err(AppError::Push(_))), "got {:?}", result);
    assert_eq!(active_users(&registry).await, vec!["b"]);
}

#[tokio::test]
async fn test_inactive_login_is_invalid_request() {
    let (client, registry) = start_server(ServerConfig::default()).await;
    let _stream_a = client.login(&User::new("a", "A")).await.unwrap();

    let login = ClientRequest::Login {
        user: User::new("b", "B"),
        active: false,
    };
    let reply = raw_call(client.url(), &serde_json::to_string(&login).unwrap()).await;
    assert_invalid_request(reply);
    assert_eq!(active_users(&registry).await, vec!["a"]);
}

#[tokio::test]
async fn test_malformed_first_frame_is_invalid_request() {
    let (client, registry) = start_server(ServerConfig::default()).await;
    let _stream_a = client.login(&User::new("a", "A")).await.unwrap();

    assert_invalid_request(raw_call(client.url(), r#"{"type":"bogus"}"#).await);
    assert_invalid_request(raw_call(client.url(), "not json").await);
    assert_eq!(active_users(&registry).await, vec!["a"]);
}

#[tokio::test]
async fn test_message_without_sender_id_is_invalid_request() {
    let (client, registry) = start_server(ServerConfig::default()).await;
    let alice = User::new("a", "A");
    let mut stream_a = client.login(&alice).await.unwrap();

    let anonymous = identity::new_message(&User::new("", "Nobody"), "m0".to_string(), "who?");
    let request = ClientRequest::SendMessage { message: anonymous };
    let reply = raw_call(client.url(), &serde_json::to_string(&request).unwrap()).await;
    assert_invalid_request(reply);
    assert_eq!(active_users(&registry).await, vec!["a"]);

    // Nothing was broadcast: the next frame A sees is its own message
    let hello = identity::new_message(&alice, "m1".to_string(), "hello");
    client.send_message(&hello).await.unwrap();
    let received = timeout(WAIT, stream_a.recv()).await.unwrap().unwrap();
    assert_eq!(received.body, "hello");
}

#[tokio::test]
async fn test_closed_client_stream_is_evicted() {
    let (client, registry) = start_server(ServerConfig::default()).await;
    let alice = User::new("a", "A");
    let bob = User::new("b", "B");

    let stream_a = client.login(&alice).await.unwrap();
    let mut stream_b = client.login(&bob).await.unwrap();
    stream_a.close().await;

    let msg = identity::new_message(&bob, "m1".to_string(), "after close");
    client.send_message(&msg).await.unwrap();
    let received = timeout(WAIT, stream_b.recv()).await.unwrap().unwrap();
    assert_eq!(received.body, "after close");

    // Eviction happens either on the failed push or on the close frame
    timeout(WAIT, async {
        while active_users(&registry).await != vec!["b"] {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Logging out an evicted user is NotFound
    let err = client.logout(&alice).await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn test_duplex_driver() {
    let (client, registry) = start_server(ServerConfig::default()).await;
    let alice = User::new("a", "A");
    let stream = client.login(&alice).await.unwrap();

    let input = Cursor::new(b"hello\nworld\n".to_vec());
    let (output, rendered) = tokio::io::duplex(1024);
    let factory = MessageFactory::new(alice.clone(), MessageIdPolicy::PerSession);
    let driver = tokio::spawn(run_duplex(client.clone(), factory, stream, input, output));

    let mut lines = BufReader::new(rendered).lines();
    let first = timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
    let second = timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
    assert_eq!(first.as_deref(), Some("A: hello"));
    assert_eq!(second.as_deref(), Some("A: world"));

    client.logout(&alice).await.unwrap();
    let outcome = timeout(WAIT, driver).await.unwrap().unwrap();
    assert!(outcome.producer.is_ok());
    assert!(matches!(outcome.receiver, Err(ClientError::StreamClosed)));
    assert!(active_users(&registry).await.is_empty());
}

#[tokio::test]
async fn test_connect_and_send_failures() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = format!("ws://{}", addr);

    // Nothing listens there any more
    let err = ChatClient::connect(url.clone()).await.unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }));

    let alice = User::new("a", "A");
    let factory = MessageFactory::new(alice, MessageIdPolicy::PerSession);
    let result = run_producer(ChatClient::new(url), factory, Cursor::new(b"lost\n".to_vec())).await;
    assert!(matches!(result, Err(ClientError::Send(_))));
}
