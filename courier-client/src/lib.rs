//! Courier Client Library
//!
//! A reconnecting socket client plus the chat view state it feeds. The
//! embedding application wires `ClientEvent`s from `SocketClient` into
//! `ChatView::apply` and executes the `Command`s that come back.

mod client;
mod state;

pub use client::{ClientEvent, SocketClient, DEFAULT_SERVER_URL};
pub use state::{ChatView, Command, PeerPresence};

// Re-export the wire types so apps depend on one crate
pub use courier_proto::{Message, MessageDraft, Reaction, UserSummary, WsMessage};
