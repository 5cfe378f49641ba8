//! SQLite persistence for users, messages, reactions, and the friend graph.
//!
//! One connection behind a mutex; callers hold the lock for the duration
//! of a single operation, which keeps multi-statement operations (history
//! sweep, friend accept) serialized against each other.

mod friends;
mod messages;
mod users;

pub use users::UserRecord;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};

/// How long after creation a message may still be edited, in milliseconds.
pub const EDIT_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

const SCHEMA: &str = "
-- Durable user records. Presence flags mirror the in-memory registry so
-- offline peers still resolve a last_seen.
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    avatar TEXT NOT NULL DEFAULT '',
    status_text TEXT NOT NULL DEFAULT 'Hey there! I am using Courier',
    is_online INTEGER NOT NULL DEFAULT 0,
    last_seen INTEGER,
    created_at INTEGER NOT NULL
);

-- Deleted messages are tombstoned, never removed, so replies keep resolving.
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    sender_id TEXT NOT NULL REFERENCES users(id),
    receiver_id TEXT NOT NULL REFERENCES users(id),
    content TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'text' CHECK(kind IN ('text', 'image', 'file', 'emoji')),
    status TEXT NOT NULL DEFAULT 'sent' CHECK(status IN ('sent', 'delivered', 'read')),
    reply_to_id TEXT REFERENCES messages(id),
    is_edited INTEGER NOT NULL DEFAULT 0,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at INTEGER,
    created_at INTEGER NOT NULL,
    edited_at INTEGER
);

-- One reaction per user per message; re-reacting replaces the emoji.
CREATE TABLE IF NOT EXISTS reactions (
    message_id TEXT NOT NULL REFERENCES messages(id),
    user_id TEXT NOT NULL REFERENCES users(id),
    emoji TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (message_id, user_id)
);

-- A pending request is a single row on the recipient side; acceptance
-- upgrades it and inserts the mirror row.
CREATE TABLE IF NOT EXISTS friend_links (
    user_id TEXT NOT NULL REFERENCES users(id),
    peer_id TEXT NOT NULL REFERENCES users(id),
    status TEXT NOT NULL CHECK(status IN ('pending', 'accepted')),
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, peer_id)
);

CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages(sender_id, receiver_id, created_at);
CREATE INDEX IF NOT EXISTS idx_messages_reply_to ON messages(reply_to_id);
CREATE INDEX IF NOT EXISTS idx_friend_links_status ON friend_links(user_id, status);
";

pub struct Store(Mutex<Connection>);

impl Store {
    /// Open (or create) the database at `path` and bootstrap the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opening database");
        Self::bootstrap(conn)
    }

    /// In-memory database for tests and ephemeral deployments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self(Mutex::new(conn)))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.0.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Collapse the no-rows case into [`StoreError::NotFound`].
fn not_found(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.db");
        let store = Store::open(&path).unwrap();
        assert!(path.exists());

        let user = store.create_user("alice").unwrap();
        assert_eq!(store.get_user(&user.id).unwrap().username, "alice");
    }

    #[test]
    fn test_schema_bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.db");
        {
            let store = Store::open(&path).unwrap();
            store.create_user("alice").unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert!(store.open_user_count().unwrap() >= 1);
    }
}

#[cfg(test)]
impl Store {
    fn open_user_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }
}
