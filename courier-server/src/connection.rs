use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::{error, info, warn};

use courier_proto::WsMessage;

use crate::delivery;
use crate::error::{AuthError, StoreError};
use crate::state::ServerState;
use crate::store::UserRecord;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection from handshake to cleanup.
pub async fn handle_connection(ws_stream: WebSocketStream<TcpStream>, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // The connection earns nothing until the token checks out
    let user = match wait_for_connect(&mut ws_receiver, &state).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Connection rejected: {}", e);
            let rejection = WsMessage::AuthResponse {
                success: false,
                message: e.to_string(),
            };
            if let Ok(json) = serde_json::to_string(&rejection) {
                let _ = ws_sender.send(Message::Text(json.into())).await;
            }
            return;
        }
    };

    info!("User connected: {} ({})", user.username, user.id);

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.presence.register(user.id.clone(), tx.clone());

    let accepted = WsMessage::AuthResponse {
        success: true,
        message: "Connected to server".to_string(),
    };
    match serde_json::to_string(&accepted) {
        Ok(json) => {
            if let Err(e) = ws_sender.send(Message::Text(json.into())).await {
                error!("Failed to send auth response to {}: {}", user.id, e);
            }
        }
        Err(e) => error!("Failed to serialize auth response: {}", e),
    }

    let now = chrono::Utc::now().timestamp_millis();
    if let Err(e) = state.store.set_presence(&user.id, true, now) {
        warn!("Failed to persist presence for {}: {}", user.id, e);
    }

    // Presence fans out to accepted friends, not the whole server
    let friends = state.store.friends_of(&user.id).unwrap_or_else(|e| {
        warn!("Failed to load friends of {}: {}", user.id, e);
        Vec::new()
    });
    let online_notice = WsMessage::UserStatusChange {
        user_id: user.id.clone(),
        is_online: true,
        last_seen: None,
    };
    match serde_json::to_string(&online_notice) {
        Ok(json) => state.presence.send_to_many(&friends, &json),
        Err(e) => error!("Failed to serialize presence notice: {}", e),
    }

    // Tell the newcomer which friends are already displayed online
    for friend_id in &friends {
        if state.presence.displayed_online(friend_id) {
            let friend_notice = WsMessage::UserStatusChange {
                user_id: friend_id.clone(),
                is_online: true,
                last_seen: None,
            };
            if let Ok(json) = serde_json::to_string(&friend_notice) {
                state.presence.send_to_user(&user.id, &json);
            }
        }
    }

    // Forward queued events to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let user_clone = user.clone();
    let state_clone = state.clone();

    loop {
        tokio::select! {
            res = ws_receiver.next() => {
                match res {
                    Some(Ok(Message::Text(text))) => {
                        delivery::handle_event(&text, &user_clone, &state_clone);
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("User {} sent close frame", user_clone.id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        // tungstenite answers pings on its own
                        let _ = data;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error for user {}: {}", user_clone.id, e);
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended for user {}", user_clone.id);
                        break;
                    }
                    _ => {}
                }
            }
            _ = &mut send_task => {
                info!("Send task finished for user {} (likely connection lost)", user_clone.id);
                break;
            }
        }
    }

    // Cleanup: this connection's timer, handle, and presence trace
    send_task.abort();
    state.typing.clear(&user.id);
    let last_handle_gone = state.presence.unregister(&user.id, &tx);

    if last_handle_gone {
        let now = chrono::Utc::now().timestamp_millis();
        if let Err(e) = state.store.set_presence(&user.id, false, now) {
            warn!("Failed to persist presence for {}: {}", user.id, e);
        }
        let offline_notice = WsMessage::UserStatusChange {
            user_id: user.id.clone(),
            is_online: false,
            last_seen: Some(now),
        };
        if let Ok(json) = serde_json::to_string(&offline_notice) {
            match state.store.friends_of(&user.id) {
                Ok(friends) => state.presence.send_to_many(&friends, &json),
                Err(e) => warn!("Failed to load friends of {}: {}", user.id, e),
            }
        }
    }

    info!("User disconnected: {}", user.id);
}

/// Wait for the `connect` frame, verify its token, and resolve the user.
/// Anything else on the wire fails the handshake closed.
async fn wait_for_connect(
    receiver: &mut SplitStream<WebSocketStream<TcpStream>>,
    state: &ServerState,
) -> Result<UserRecord, AuthError> {
    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(result) = receiver.next().await {
            let text = match result {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => return Err(AuthError::Missing),
                // Control frames may precede the handshake
                _ => continue,
            };
            let token = match serde_json::from_str::<WsMessage>(&text) {
                Ok(WsMessage::Connect { token }) => token,
                Ok(_) => return Err(AuthError::Malformed),
                Err(e) => {
                    warn!("Unparseable handshake frame: {}", e);
                    return Err(AuthError::Malformed);
                }
            };
            let user_id = state.tokens.verify(&token)?;
            return match state.store.get_user(&user_id) {
                Ok(user) => Ok(user),
                Err(StoreError::NotFound) => Err(AuthError::UnknownUser),
                Err(e) => {
                    error!("User lookup failed during handshake: {}", e);
                    Err(AuthError::UnknownUser)
                }
            };
        }
        Err(AuthError::Missing)
    });

    match handshake.await {
        Ok(result) => result,
        Err(_) => {
            warn!("Handshake timed out");
            Err(AuthError::Missing)
        }
    }
}
