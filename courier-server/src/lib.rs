//! Courier Relay Server Library
//!
//! This module exposes the server components for use in integration tests.

mod auth;
mod config;
mod connection;
mod delivery;
mod error;
mod presence;
mod relay;
mod state;
mod store;
mod typing;

pub use auth::TokenKeeper;
pub use config::Config;
pub use connection::handle_connection;
pub use delivery::handle_event;
pub use error::{AuthError, ConfigError, StoreError};
pub use presence::PresenceRegistry;
pub use state::ServerState;
pub use store::{Store, UserRecord};
pub use typing::TypingTracker;
