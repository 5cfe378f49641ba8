use serde::{Deserialize, Serialize};

/// Content a tombstoned message carries in place of its original text.
pub const DELETED_MESSAGE_PLACEHOLDER: &str = "This message was deleted";

/// Public subset of a user record attached to pushed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub avatar: String,
}

/// One reaction on a message. A user holds at most one entry per message;
/// re-reacting replaces the emoji but keeps the original timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: String,
    pub username: String,
    pub emoji: String,
    pub created_at: i64,
}

/// Resolved view of the message a reply points at. Stays resolvable after
/// the target is deleted, in which case `content` is the placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub id: String,
    pub content: String,
    pub sender: UserSummary,
    pub is_deleted: bool,
    pub created_at: i64,
}

/// A fully hydrated message as pushed to clients and returned by the
/// history endpoint. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub sender: UserSummary,
    pub receiver: UserSummary,
    pub content: String,
    /// One of `text`, `image`, `file`, `emoji`.
    pub kind: String,
    /// One of `sent`, `delivered`, `read`. Never regresses.
    pub status: String,
    pub reply_to: Option<ReplyPreview>,
    pub reactions: Vec<Reaction>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<i64>,
    pub created_at: i64,
    pub edited_at: Option<i64>,
}
