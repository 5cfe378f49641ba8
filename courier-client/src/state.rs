use std::collections::{HashMap, HashSet};

use tracing::warn;

use courier_proto::{Message, WsMessage, DELETED_MESSAGE_PLACEHOLDER};

/// Last presence pushed by the server for a peer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerPresence {
    pub is_online: bool,
    pub last_seen: Option<i64>,
}

/// Follow-up work a state transition asks of the embedding app.
///
/// The view never talks to the network itself; it hands these back so the
/// app can route them through its socket and REST clients.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send this frame to the server.
    Send(WsMessage),
    /// Refetch the friends list.
    RefreshFriends,
    /// Refetch pending friend requests.
    RefreshRequests,
    /// Refetch the conversation with this peer.
    FetchHistory(String),
}

/// One user's view of their chats, patched incrementally by server pushes.
///
/// Pushes are deltas against already-loaded state: a patch for a message
/// outside the open conversation window is dropped, and the next history
/// fetch returns the patched record anyway.
pub struct ChatView {
    self_id: String,
    active_peer: Option<String>,
    conversation: Vec<Message>,
    presence: HashMap<String, PeerPresence>,
    typing: HashSet<String>,
    unread: HashMap<String, u32>,
}

impl ChatView {
    pub fn new(self_id: String) -> Self {
        Self {
            self_id,
            active_peer: None,
            conversation: Vec::new(),
            presence: HashMap::new(),
            typing: HashSet::new(),
            unread: HashMap::new(),
        }
    }

    /// Apply one server push and return the follow-up commands.
    pub fn apply(&mut self, event: WsMessage) -> Vec<Command> {
        match event {
            WsMessage::ReceiveMessage { message } => self.on_receive(message),
            WsMessage::MessageSent { message } => {
                if self.active_peer.as_deref() == Some(message.receiver_id.as_str()) {
                    self.conversation.push(message);
                }
                Vec::new()
            }
            WsMessage::MessageStatusUpdate { message_id, status } => {
                self.patch(&message_id, |m| m.status = status);
                Vec::new()
            }
            WsMessage::MessageEdited {
                message_id,
                new_content,
            } => {
                self.patch(&message_id, |m| {
                    m.content = new_content;
                    m.is_edited = true;
                });
                Vec::new()
            }
            WsMessage::MessageDeleted { message_id } => {
                self.patch(&message_id, |m| {
                    m.content = DELETED_MESSAGE_PLACEHOLDER.to_string();
                    m.is_deleted = true;
                });
                Vec::new()
            }
            WsMessage::MessageReactionUpdate {
                message_id,
                reactions,
            } => {
                self.patch(&message_id, |m| m.reactions = reactions);
                Vec::new()
            }
            WsMessage::TypingStatus { user_id, is_typing } => {
                if is_typing {
                    self.typing.insert(user_id);
                } else {
                    self.typing.remove(&user_id);
                }
                Vec::new()
            }
            WsMessage::UserStatusChange {
                user_id,
                is_online,
                last_seen,
            } => {
                self.presence.insert(
                    user_id,
                    PeerPresence {
                        is_online,
                        last_seen,
                    },
                );
                Vec::new()
            }
            WsMessage::FriendRequestReceived { .. } => vec![Command::RefreshRequests],
            WsMessage::FriendRequestAccepted { .. } => vec![Command::RefreshFriends],
            WsMessage::FriendRequestRejected { .. } => Vec::new(),
            WsMessage::FriendRemoved { user } => self.on_friend_removed(&user.id),
            WsMessage::Error { context, reason } => {
                warn!(context = %context, reason = %reason, "Server rejected an operation");
                Vec::new()
            }
            // Frames the server never pushes
            _ => Vec::new(),
        }
    }

    fn on_receive(&mut self, message: Message) -> Vec<Command> {
        // A landed message ends any typing indicator from its sender
        self.typing.remove(&message.sender_id);

        if self.active_peer.as_deref() == Some(message.sender_id.as_str()) {
            // The open conversation acknowledges what it displays
            let ack = Command::Send(WsMessage::MessageRead {
                message_id: message.id.clone(),
                sender_id: message.sender_id.clone(),
            });
            self.conversation.push(message);
            vec![ack]
        } else {
            *self.unread.entry(message.sender_id.clone()).or_insert(0) += 1;
            Vec::new()
        }
    }

    fn on_friend_removed(&mut self, peer_id: &str) -> Vec<Command> {
        self.presence.remove(peer_id);
        self.typing.remove(peer_id);
        self.unread.remove(peer_id);
        if self.active_peer.as_deref() == Some(peer_id) {
            self.active_peer = None;
            self.conversation.clear();
        }
        vec![Command::RefreshFriends]
    }

    /// Open the conversation with `peer_id` and ask for a fresh page.
    pub fn select_peer(&mut self, peer_id: &str) -> Vec<Command> {
        self.active_peer = Some(peer_id.to_string());
        self.conversation.clear();
        self.unread.remove(peer_id);
        vec![Command::FetchHistory(peer_id.to_string())]
    }

    /// Install a fetched history page, unless the user already moved on.
    pub fn replace_conversation(&mut self, peer_id: &str, messages: Vec<Message>) {
        if self.active_peer.as_deref() == Some(peer_id) {
            self.conversation = messages;
        }
    }

    /// Reset after a (re)connect. Live signals from before the gap are
    /// stale; durable state is refetched rather than replayed.
    pub fn on_connected(&mut self) -> Vec<Command> {
        self.presence.clear();
        self.typing.clear();
        let mut commands = vec![Command::RefreshFriends, Command::RefreshRequests];
        if let Some(peer) = &self.active_peer {
            commands.push(Command::FetchHistory(peer.clone()));
        }
        commands
    }

    /// The connection dropped; nobody is typing at us anymore.
    pub fn on_disconnected(&mut self) {
        self.typing.clear();
    }

    fn patch<F: FnOnce(&mut Message)>(&mut self, message_id: &str, f: F) {
        if let Some(message) = self.conversation.iter_mut().find(|m| m.id == message_id) {
            f(message);
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn active_peer(&self) -> Option<&str> {
        self.active_peer.as_deref()
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    pub fn unread_from(&self, peer_id: &str) -> u32 {
        self.unread.get(peer_id).copied().unwrap_or(0)
    }

    pub fn is_typing(&self, peer_id: &str) -> bool {
        self.typing.contains(peer_id)
    }

    pub fn presence_of(&self, peer_id: &str) -> Option<&PeerPresence> {
        self.presence.get(peer_id)
    }
}
