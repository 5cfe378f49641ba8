use std::sync::Arc;

use tracing::{error, warn};

use courier_proto::{MessageDraft, WsMessage};

use crate::error::StoreError;
use crate::relay;
use crate::state::ServerState;
use crate::store::UserRecord;
use crate::typing::TypingTracker;

/// Dispatch one inbound frame from an authenticated connection.
///
/// The sender's identity always comes from the connection, never from the
/// payload, so a client cannot speak as anyone else.
pub fn handle_event(text: &str, sender: &UserRecord, state: &Arc<ServerState>) {
    let event: WsMessage = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to parse frame from {}: {}", sender.id, e);
            return;
        }
    };

    match event {
        WsMessage::PrivateMessage { to, message } => {
            handle_private_message(state, sender, &to, &message);
        }
        WsMessage::MessageRead {
            message_id,
            sender_id,
        } => {
            handle_message_read(state, &message_id, &sender_id);
        }
        WsMessage::TypingStart { receiver_id } => {
            TypingTracker::start(state, &sender.id, &receiver_id);
        }
        WsMessage::UserActive => handle_activity(state, sender, true),
        WsMessage::UserInactive => handle_activity(state, sender, false),
        WsMessage::EditMessage {
            message_id,
            receiver_id,
            new_content,
        } => {
            handle_edit(state, sender, &message_id, &receiver_id, &new_content);
        }
        WsMessage::DeleteMessage {
            message_id,
            receiver_id,
        } => {
            handle_delete(state, sender, &message_id, &receiver_id);
        }
        WsMessage::MessageReaction { message_id, emoji } => {
            handle_reaction(state, sender, &message_id, &emoji);
        }
        WsMessage::FriendRequest { to } => relay::friend_request(state, sender, &to),
        WsMessage::FriendRequestResponse { to, accepted } => {
            relay::friend_request_response(state, sender, &to, accepted);
        }
        WsMessage::FriendRemove { user_id } => relay::friend_remove(state, sender, &user_id),
        // A repeated handshake on a live connection changes nothing
        WsMessage::Connect { .. } => {}
        // Server-to-client frames have no meaning coming from a client
        _ => {}
    }
}

/// Persist, push to the receiver if reachable, then echo to the sender.
///
/// The echo always carries the record as created (`status: sent`); an
/// unreachable receiver recovers the message through a history fetch, not
/// through any queued push.
fn handle_private_message(
    state: &Arc<ServerState>,
    sender: &UserRecord,
    to: &str,
    draft: &MessageDraft,
) {
    let message = match state.store.create_message(&sender.id, to, draft) {
        Ok(message) => message,
        Err(e) => {
            warn!("Rejected message from {} to {}: {}", sender.id, to, e);
            send_error(state, &sender.id, "private_message", &e);
            return;
        }
    };

    let reached = push_to(
        state,
        to,
        &WsMessage::ReceiveMessage {
            message: message.clone(),
        },
    );
    if reached {
        if let Err(e) = state.store.mark_delivered(&message.id) {
            warn!("Failed to mark message {} delivered: {}", message.id, e);
        }
    }

    push_to(state, &sender.id, &WsMessage::MessageSent { message });
}

/// Advance one message to read and tell its original sender. This is
/// fire-and-forget: an unknown id stays a silent no-op and the status
/// push is not retried.
fn handle_message_read(state: &Arc<ServerState>, message_id: &str, original_sender: &str) {
    if let Err(e) = state.store.mark_read(message_id) {
        warn!("Failed to mark message {} read: {}", message_id, e);
        return;
    }
    push_to(
        state,
        original_sender,
        &WsMessage::MessageStatusUpdate {
            message_id: message_id.to_string(),
            status: "read".to_string(),
        },
    );
}

/// Window focus/blur override. Adjusts displayed presence and the durable
/// row, then tells the sender's friends.
fn handle_activity(state: &Arc<ServerState>, sender: &UserRecord, active: bool) {
    if active {
        state.presence.mark_active(&sender.id);
    } else {
        state.presence.mark_inactive(&sender.id);
    }

    let now = chrono::Utc::now().timestamp_millis();
    if let Err(e) = state.store.set_presence(&sender.id, active, now) {
        warn!("Failed to persist presence for {}: {}", sender.id, e);
    }

    let friends = match state.store.friends_of(&sender.id) {
        Ok(friends) => friends,
        Err(e) => {
            warn!("Failed to load friends of {}: {}", sender.id, e);
            return;
        }
    };
    let notice = WsMessage::UserStatusChange {
        user_id: sender.id.clone(),
        is_online: active,
        last_seen: if active { None } else { Some(now) },
    };
    match serde_json::to_string(&notice) {
        Ok(json) => state.presence.send_to_many(&friends, &json),
        Err(e) => error!("Failed to serialize presence notice: {}", e),
    }
}

fn handle_edit(
    state: &Arc<ServerState>,
    sender: &UserRecord,
    message_id: &str,
    receiver_id: &str,
    new_content: &str,
) {
    if let Err(e) = state.store.edit_message(message_id, &sender.id, new_content) {
        warn!("Rejected edit of {} by {}: {}", message_id, sender.id, e);
        send_error(state, &sender.id, "edit_message", &e);
        return;
    }

    let event = WsMessage::MessageEdited {
        message_id: message_id.to_string(),
        new_content: new_content.to_string(),
    };
    push_to(state, receiver_id, &event);
    // The initiator's other devices follow the same patch
    push_to(state, &sender.id, &event);
}

fn handle_delete(
    state: &Arc<ServerState>,
    sender: &UserRecord,
    message_id: &str,
    receiver_id: &str,
) {
    if let Err(e) = state.store.delete_message(message_id, &sender.id) {
        warn!("Rejected delete of {} by {}: {}", message_id, sender.id, e);
        send_error(state, &sender.id, "delete_message", &e);
        return;
    }

    let event = WsMessage::MessageDeleted {
        message_id: message_id.to_string(),
    };
    push_to(state, receiver_id, &event);
    push_to(state, &sender.id, &event);
}

/// Both participants get the full post-upsert reaction list. The pair is
/// taken from the stored message, not the payload.
fn handle_reaction(state: &Arc<ServerState>, sender: &UserRecord, message_id: &str, emoji: &str) {
    let message = match state.store.react(message_id, &sender.id, emoji) {
        Ok(message) => message,
        Err(e) => {
            warn!("Rejected reaction on {} by {}: {}", message_id, sender.id, e);
            send_error(state, &sender.id, "message_reaction", &e);
            return;
        }
    };

    let event = WsMessage::MessageReactionUpdate {
        message_id: message.id.clone(),
        reactions: message.reactions.clone(),
    };
    push_to(state, &message.sender_id, &event);
    if message.receiver_id != message.sender_id {
        push_to(state, &message.receiver_id, &event);
    }
}

/// Serialize and push one event to all of a user's connections. Returns
/// true if anyone took it.
pub(crate) fn push_to(state: &ServerState, user_id: &str, event: &WsMessage) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => state.presence.send_to_user(user_id, &json),
        Err(e) => {
            error!("Failed to serialize event for {}: {}", user_id, e);
            false
        }
    }
}

/// Report a failed store operation to the initiator and nobody else.
fn send_error(state: &ServerState, user_id: &str, context: &str, err: &StoreError) {
    push_to(
        state,
        user_id,
        &WsMessage::Error {
            context: context.to_string(),
            reason: err.reason().to_string(),
        },
    );
}
