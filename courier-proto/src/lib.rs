//! Courier Wire Protocol
//!
//! Event and model types shared by the server and client crates. Every
//! frame on the socket is one JSON-encoded [`WsMessage`].

mod events;
mod input;
mod models;

pub use events::WsMessage;
pub use input::{MessageDraft, ValidateExt, MAX_CONTENT_LENGTH, MAX_EMOJI_LENGTH};
pub use models::{Message, Reaction, ReplyPreview, UserSummary, DELETED_MESSAGE_PLACEHOLDER};
