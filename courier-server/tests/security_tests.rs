use std::sync::Arc;

use tokio::sync::mpsc;

use courier_proto::{MessageDraft, WsMessage};
use courier_server::{handle_event, ServerState, Store, TokenKeeper};

fn test_state() -> Arc<ServerState> {
    let store = Store::open_in_memory().unwrap();
    Arc::new(ServerState::new(store, TokenKeeper::new(b"test-secret", 24)))
}

#[tokio::test]
async fn test_sender_spoofing_protection() {
    let state = test_state();
    let mallory = state.store.create_user("mallory").unwrap();
    let victim = state.store.create_user("victim").unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.presence.register(victim.id.clone(), tx);

    // The payload smuggles a sender_id field the protocol does not define
    let spoofed_json = format!(
        r#"{{
            "type": "private_message",
            "to": "{}",
            "sender_id": "admin",
            "message": {{ "content": "Click this link", "kind": "text" }}
        }}"#,
        victim.id
    );

    // "mallory" is the authenticated connection
    handle_event(&spoofed_json, &mallory, &state);

    // Check what the victim received
    if let Some(msg_str) = rx.recv().await {
        let msg: WsMessage = serde_json::from_str(&msg_str).unwrap();
        if let WsMessage::ReceiveMessage { message } = msg {
            assert_eq!(
                message.sender_id, mallory.id,
                "Sender must be the authenticated connection"
            );
            assert_ne!(message.sender_id, "admin", "Spoofed sender ID persisted!");
            assert_eq!(message.sender.username, "mallory");
        } else {
            panic!("Expected ReceiveMessage");
        }
    } else {
        panic!("Victim received nothing");
    }
}

#[tokio::test]
async fn test_typing_identity_comes_from_connection() {
    let state = test_state();
    let mallory = state.store.create_user("mallory").unwrap();
    let victim = state.store.create_user("victim").unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.presence.register(victim.id.clone(), tx);

    // A user_id field in the payload is not part of the event and is dropped
    let spoofed_json = format!(
        r#"{{"type": "typing_start", "receiver_id": "{}", "user_id": "admin"}}"#,
        victim.id
    );

    handle_event(&spoofed_json, &mallory, &state);

    if let Some(msg_str) = rx.recv().await {
        let msg: WsMessage = serde_json::from_str(&msg_str).unwrap();
        if let WsMessage::TypingStatus { user_id, is_typing } = msg {
            assert_eq!(user_id, mallory.id, "Typing identity must be the connection");
            assert!(is_typing);
        } else {
            panic!("Expected TypingStatus");
        }
    } else {
        panic!("Victim received nothing");
    }
}

#[tokio::test]
async fn test_edit_requires_authorship() {
    let state = test_state();
    let mallory = state.store.create_user("mallory").unwrap();
    let victim = state.store.create_user("victim").unwrap();

    let draft = MessageDraft {
        content: "mine".to_string(),
        kind: "text".to_string(),
        reply_to: None,
    };
    let message = state
        .store
        .create_message(&victim.id, &mallory.id, &draft)
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.presence.register(mallory.id.clone(), tx);

    let edit_json = format!(
        r#"{{"type": "edit_message", "message_id": "{}", "receiver_id": "{}", "new_content": "pwned"}}"#,
        message.id, victim.id
    );

    handle_event(&edit_json, &mallory, &state);

    // The author check bounces the edit back to the initiator only
    if let Some(msg_str) = rx.recv().await {
        let msg: WsMessage = serde_json::from_str(&msg_str).unwrap();
        if let WsMessage::Error { context, reason } = msg {
            assert_eq!(context, "edit_message");
            assert_eq!(reason, "unauthorized");
        } else {
            panic!("Expected Error");
        }
    } else {
        panic!("Mallory received nothing");
    }

    assert_eq!(state.store.get_message(&message.id).unwrap().content, "mine");
}

#[tokio::test]
async fn test_delete_requires_authorship() {
    let state = test_state();
    let mallory = state.store.create_user("mallory").unwrap();
    let victim = state.store.create_user("victim").unwrap();

    let draft = MessageDraft {
        content: "keep me".to_string(),
        kind: "text".to_string(),
        reply_to: None,
    };
    let message = state
        .store
        .create_message(&victim.id, &mallory.id, &draft)
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    state.presence.register(mallory.id.clone(), tx);

    let delete_json = format!(
        r#"{{"type": "delete_message", "message_id": "{}", "receiver_id": "{}"}}"#,
        message.id, victim.id
    );

    handle_event(&delete_json, &mallory, &state);

    if let Some(msg_str) = rx.recv().await {
        let msg: WsMessage = serde_json::from_str(&msg_str).unwrap();
        if let WsMessage::Error { context, reason } = msg {
            assert_eq!(context, "delete_message");
            assert_eq!(reason, "unauthorized");
        } else {
            panic!("Expected Error");
        }
    } else {
        panic!("Mallory received nothing");
    }

    let stored = state.store.get_message(&message.id).unwrap();
    assert!(!stored.is_deleted);
    assert_eq!(stored.content, "keep me");
}
