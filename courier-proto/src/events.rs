use serde::{Deserialize, Serialize};

use crate::input::MessageDraft;
use crate::models::{Message, Reaction, UserSummary};

/// WebSocket frames exchanged between clients and the server.
///
/// The first client frame on a fresh connection must be `Connect`; every
/// other client-to-server variant is rejected until the handshake is done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    // --- client to server ---
    /// Handshake frame carrying the signed bearer token.
    #[serde(rename = "connect")]
    Connect { token: String },

    /// Create a message addressed to `to` and deliver it.
    #[serde(rename = "private_message")]
    PrivateMessage { to: String, message: MessageDraft },

    /// The client rendered a message; advance it to read and tell the
    /// original sender.
    #[serde(rename = "message_read")]
    MessageRead {
        message_id: String,
        sender_id: String,
    },

    /// Keystroke signal. Re-arms the 3 second typing timer.
    #[serde(rename = "typing_start")]
    TypingStart { receiver_id: String },

    /// Window focus regained; display as online again.
    #[serde(rename = "user_active")]
    UserActive,

    /// Window blurred; display as away while staying reachable.
    #[serde(rename = "user_inactive")]
    UserInactive,

    #[serde(rename = "edit_message")]
    EditMessage {
        message_id: String,
        receiver_id: String,
        new_content: String,
    },

    #[serde(rename = "delete_message")]
    DeleteMessage {
        message_id: String,
        receiver_id: String,
    },

    /// Upsert the sender's reaction on a message.
    #[serde(rename = "message_reaction")]
    MessageReaction { message_id: String, emoji: String },

    /// Notify `to` that a friend request now awaits them.
    #[serde(rename = "friend_request")]
    FriendRequest { to: String },

    /// Notify `to` how their request was answered.
    #[serde(rename = "friend_request_response")]
    FriendRequestResponse { to: String, accepted: bool },

    /// Notify a former friend that the link was severed.
    #[serde(rename = "friend_remove")]
    FriendRemove { user_id: String },

    // --- server to client ---
    /// Handshake verdict. On failure the connection closes right after.
    #[serde(rename = "auth_response")]
    AuthResponse { success: bool, message: String },

    /// A new message addressed to this client.
    #[serde(rename = "receive_message")]
    ReceiveMessage { message: Message },

    /// Echo of the client's own send, carrying the canonical record.
    #[serde(rename = "message_sent")]
    MessageSent { message: Message },

    #[serde(rename = "message_status_update")]
    MessageStatusUpdate { message_id: String, status: String },

    #[serde(rename = "typing_status")]
    TypingStatus { user_id: String, is_typing: bool },

    /// Presence change of a friend. `last_seen` is set when going offline.
    #[serde(rename = "user_status_change")]
    UserStatusChange {
        user_id: String,
        is_online: bool,
        last_seen: Option<i64>,
    },

    #[serde(rename = "message_edited")]
    MessageEdited {
        message_id: String,
        new_content: String,
    },

    #[serde(rename = "message_deleted")]
    MessageDeleted { message_id: String },

    /// Full post-upsert reaction list for a message.
    #[serde(rename = "message_reaction_update")]
    MessageReactionUpdate {
        message_id: String,
        reactions: Vec<Reaction>,
    },

    #[serde(rename = "friend_request_received")]
    FriendRequestReceived { user: UserSummary },

    #[serde(rename = "friend_request_accepted")]
    FriendRequestAccepted { user: UserSummary },

    #[serde(rename = "friend_request_rejected")]
    FriendRequestRejected { user: UserSummary },

    #[serde(rename = "friend_removed")]
    FriendRemoved { user: UserSummary },

    /// A store-backed operation failed. Sent only to the initiator.
    #[serde(rename = "error")]
    Error { context: String, reason: String },
}
