use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

use courier_client::{ClientEvent, MessageDraft, SocketClient, WsMessage};
use courier_server::{handle_connection, ServerState, Store, TokenKeeper};

/// Start a real Courier server on an ephemeral port.
async fn start_test_server() -> (String, Arc<ServerState>, tokio::task::JoinHandle<()>) {
    let store = Store::open_in_memory().expect("Failed to open in-memory store");
    let tokens = TokenKeeper::new(b"test-secret", 24);
    let state = Arc::new(ServerState::new(store, tokens));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let port = listener.local_addr().expect("Failed to get local addr").port();

    let accept_state = state.clone();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let state = accept_state.clone();
            tokio::spawn(async move {
                if let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await {
                    handle_connection(ws_stream, state).await;
                }
            });
        }
    });

    // Give the server a moment to start
    sleep(Duration::from_millis(50)).await;

    (format!("ws://127.0.0.1:{}", port), state, handle)
}

#[tokio::test]
async fn test_client_connects_and_reports_events() {
    let (url, state, server_handle) = start_test_server().await;
    let alice = state.store.create_user("alice").expect("create user");
    let token = state.tokens.issue(&alice.id);

    let client = SocketClient::with_url(url);
    let mut events = client.connect(&token).await;

    match timeout(Duration::from_secs(5), events.recv()).await {
        Ok(Some(ClientEvent::Connected)) => {}
        other => panic!("Expected Connected event, got {:?}", other),
    }
    assert!(client.is_connected().await);

    client.disconnect();
    match timeout(Duration::from_secs(5), events.recv()).await {
        Ok(Some(ClientEvent::Disconnected)) => {}
        other => panic!("Expected Disconnected event, got {:?}", other),
    }
    assert!(!client.is_connected().await);

    server_handle.abort();
}

#[tokio::test]
async fn test_bad_token_never_connects() {
    let (url, _state, server_handle) = start_test_server().await;

    let client = SocketClient::with_url(url);
    let mut events = client.connect("not-a-token").await;

    // The handshake is rejected, so the Connected event never fires
    let result = timeout(Duration::from_millis(800), events.recv()).await;
    assert!(result.is_err(), "Got an event despite a bad token: {:?}", result);
    assert!(!client.is_connected().await);

    client.disconnect();
    server_handle.abort();
}

#[tokio::test]
async fn test_push_round_trip_between_clients() {
    let (url, state, server_handle) = start_test_server().await;
    let alice = state.store.create_user("alice").expect("create user");
    let bob = state.store.create_user("bob").expect("create user");

    let alice_client = SocketClient::with_url(url.clone());
    let mut alice_events = alice_client.connect(&state.tokens.issue(&alice.id)).await;
    match timeout(Duration::from_secs(5), alice_events.recv()).await {
        Ok(Some(ClientEvent::Connected)) => {}
        other => panic!("Expected Connected event, got {:?}", other),
    }

    let bob_client = SocketClient::with_url(url);
    let mut bob_events = bob_client.connect(&state.tokens.issue(&bob.id)).await;
    match timeout(Duration::from_secs(5), bob_events.recv()).await {
        Ok(Some(ClientEvent::Connected)) => {}
        other => panic!("Expected Connected event, got {:?}", other),
    }

    alice_client
        .send(WsMessage::PrivateMessage {
            to: bob.id.clone(),
            message: MessageDraft {
                content: "Hello from the client!".to_string(),
                kind: "text".to_string(),
                reply_to: None,
            },
        })
        .expect("send should succeed while connected");

    match timeout(Duration::from_secs(5), bob_events.recv()).await {
        Ok(Some(ClientEvent::Push(WsMessage::ReceiveMessage { message }))) => {
            assert_eq!(message.content, "Hello from the client!");
            assert_eq!(message.sender_id, alice.id);
            assert_eq!(message.sender.username, "alice");
        }
        other => panic!("Expected ReceiveMessage push, got {:?}", other),
    }

    // The sender hears their own echo with the stored record
    match timeout(Duration::from_secs(5), alice_events.recv()).await {
        Ok(Some(ClientEvent::Push(WsMessage::MessageSent { message }))) => {
            assert_eq!(message.receiver_id, bob.id);
        }
        other => panic!("Expected MessageSent echo, got {:?}", other),
    }

    alice_client.disconnect();
    bob_client.disconnect();
    server_handle.abort();
}
