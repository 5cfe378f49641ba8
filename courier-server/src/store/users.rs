use rusqlite::Connection;

use courier_proto::UserSummary;

use crate::error::{Result, StoreError};
use crate::store::{not_found, Store};

const MAX_USERNAME_LENGTH: usize = 64;

/// Full user row. The wire only ever sees the [`UserSummary`] subset.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub avatar: String,
    pub status_text: String,
    pub is_online: bool,
    pub last_seen: Option<i64>,
    pub created_at: i64,
}

impl UserRecord {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        avatar: row.get(2)?,
        status_text: row.get(3)?,
        is_online: row.get::<_, i32>(4)? == 1,
        last_seen: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub(super) fn get_user_with(conn: &Connection, id: &str) -> Result<UserRecord> {
    conn.query_row(
        "SELECT id, username, avatar, status_text, is_online, last_seen, created_at
         FROM users WHERE id = ?1",
        [id],
        row_to_user,
    )
    .map_err(not_found)
}

impl Store {
    pub fn create_user(&self, username: &str) -> Result<UserRecord> {
        let username = username.trim();
        if username.is_empty() || username.len() > MAX_USERNAME_LENGTH {
            return Err(StoreError::Validation(
                "username length out of range".to_string(),
            ));
        }

        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)",
            (&id, username, now),
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Validation("username already taken".to_string())
            }
            other => StoreError::Sqlite(other),
        })?;

        get_user_with(&conn, &id)
    }

    pub fn get_user(&self, id: &str) -> Result<UserRecord> {
        let conn = self.conn()?;
        get_user_with(&conn, id)
    }

    pub fn user_summary(&self, id: &str) -> Result<UserSummary> {
        Ok(self.get_user(id)?.summary())
    }

    /// Mirror a presence transition into the durable row. `last_seen` is
    /// written on both transitions so offline peers resolve a recent value.
    pub fn set_presence(&self, id: &str, is_online: bool, last_seen: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE users SET is_online = ?1, last_seen = ?2 WHERE id = ?3",
            (is_online, last_seen, id),
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_defaults() {
        let store = Store::open_in_memory().unwrap();
        let user = store.create_user("alice").unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.avatar, "");
        assert_eq!(user.status_text, "Hey there! I am using Courier");
        assert!(!user.is_online);
        assert!(user.last_seen.is_none());
    }

    #[test]
    fn test_username_is_trimmed() {
        let store = Store::open_in_memory().unwrap();
        let user = store.create_user("  bob  ").unwrap();
        assert_eq!(user.username, "bob");
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let store = Store::open_in_memory().unwrap();
        store.create_user("alice").unwrap();
        let err = store.create_user("alice").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_blank_username_rejected() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.create_user("   "),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_get_unknown_user_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.get_user("missing"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_set_presence_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let user = store.create_user("alice").unwrap();

        store.set_presence(&user.id, true, 1000).unwrap();
        let online = store.get_user(&user.id).unwrap();
        assert!(online.is_online);
        assert_eq!(online.last_seen, Some(1000));

        store.set_presence(&user.id, false, 2000).unwrap();
        let offline = store.get_user(&user.id).unwrap();
        assert!(!offline.is_online);
        assert_eq!(offline.last_seen, Some(2000));
    }

    #[test]
    fn test_set_presence_unknown_user() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.set_presence("missing", true, 0),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_summary_subset() {
        let store = Store::open_in_memory().unwrap();
        let user = store.create_user("alice").unwrap();
        let summary = store.user_summary(&user.id).unwrap();
        assert_eq!(summary.id, user.id);
        assert_eq!(summary.username, "alice");
    }
}
