use rusqlite::{Connection, OptionalExtension};

use courier_proto::{
    Message, MessageDraft, Reaction, ReplyPreview, UserSummary, ValidateExt,
    DELETED_MESSAGE_PLACEHOLDER, MAX_CONTENT_LENGTH, MAX_EMOJI_LENGTH,
};

use crate::error::{Result, StoreError};
use crate::store::{not_found, Store, EDIT_WINDOW_MS};

const MAX_HISTORY_LIMIT: i64 = 100;

/// Maps one joined row to a message plus its raw reply reference. Columns:
/// the message row, then sender and receiver username/avatar.
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Message, Option<String>)> {
    let sender_id: String = row.get(1)?;
    let receiver_id: String = row.get(2)?;
    let message = Message {
        id: row.get(0)?,
        sender: UserSummary {
            id: sender_id.clone(),
            username: row.get(12)?,
            avatar: row.get(13)?,
        },
        receiver: UserSummary {
            id: receiver_id.clone(),
            username: row.get(14)?,
            avatar: row.get(15)?,
        },
        sender_id,
        receiver_id,
        content: row.get(3)?,
        kind: row.get(4)?,
        status: row.get(5)?,
        reply_to: None,
        reactions: Vec::new(),
        is_edited: row.get::<_, i32>(7)? == 1,
        is_deleted: row.get::<_, i32>(8)? == 1,
        deleted_at: row.get(9)?,
        created_at: row.get(10)?,
        edited_at: row.get(11)?,
    };
    Ok((message, row.get(6)?))
}

fn load_reply_preview(conn: &Connection, reply_id: &str) -> Result<Option<ReplyPreview>> {
    let preview = conn
        .query_row(
            "SELECT p.id, p.content, p.is_deleted, p.created_at, p.sender_id, u.username, u.avatar
             FROM messages p
             JOIN users u ON u.id = p.sender_id
             WHERE p.id = ?1",
            [reply_id],
            |row| {
                Ok(ReplyPreview {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    is_deleted: row.get::<_, i32>(2)? == 1,
                    created_at: row.get(3)?,
                    sender: UserSummary {
                        id: row.get(4)?,
                        username: row.get(5)?,
                        avatar: row.get(6)?,
                    },
                })
            },
        )
        .optional()?;
    Ok(preview)
}

fn load_reactions(conn: &Connection, message_id: &str) -> Result<Vec<Reaction>> {
    let mut stmt = conn.prepare(
        "SELECT r.user_id, u.username, r.emoji, r.created_at
         FROM reactions r
         JOIN users u ON u.id = r.user_id
         WHERE r.message_id = ?1
         ORDER BY r.created_at ASC, r.user_id ASC",
    )?;
    let reactions = stmt
        .query_map([message_id], |row| {
            Ok(Reaction {
                user_id: row.get(0)?,
                username: row.get(1)?,
                emoji: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(reactions)
}

fn get_message_with(conn: &Connection, id: &str) -> Result<Message> {
    let (mut message, reply_id) = conn
        .query_row(
            "SELECT m.id, m.sender_id, m.receiver_id, m.content, m.kind, m.status,
                    m.reply_to_id, m.is_edited, m.is_deleted, m.deleted_at, m.created_at,
                    m.edited_at, s.username, s.avatar, r.username, r.avatar
             FROM messages m
             JOIN users s ON s.id = m.sender_id
             JOIN users r ON r.id = m.receiver_id
             WHERE m.id = ?1",
            [id],
            row_to_message,
        )
        .map_err(not_found)?;
    if let Some(reply_id) = reply_id {
        message.reply_to = load_reply_preview(conn, &reply_id)?;
    }
    message.reactions = load_reactions(conn, id)?;
    Ok(message)
}

impl Store {
    /// Persist a new message with `status = sent` and return it hydrated.
    /// A reply must target an existing, non-deleted message between the
    /// same two users.
    pub fn create_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        draft: &MessageDraft,
    ) -> Result<Message> {
        draft.validate_input().map_err(StoreError::Validation)?;
        let conn = self.conn()?;

        conn.query_row("SELECT 1 FROM users WHERE id = ?1", [receiver_id], |_| Ok(()))
            .map_err(not_found)?;

        if let Some(reply_id) = &draft.reply_to {
            let target = conn
                .query_row(
                    "SELECT sender_id, receiver_id, is_deleted FROM messages WHERE id = ?1",
                    [reply_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i32>(2)?,
                        ))
                    },
                )
                .optional()?;
            let (target_sender, target_receiver, target_deleted) = match target {
                Some(t) => t,
                None => {
                    return Err(StoreError::InvalidReply(
                        "reply target not found".to_string(),
                    ))
                }
            };
            if target_deleted == 1 {
                return Err(StoreError::InvalidReply(
                    "reply target was deleted".to_string(),
                ));
            }
            let same_pair = (target_sender == sender_id && target_receiver == receiver_id)
                || (target_sender == receiver_id && target_receiver == sender_id);
            if !same_pair {
                return Err(StoreError::InvalidReply(
                    "reply target belongs to another conversation".to_string(),
                ));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, kind, status, reply_to_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'sent', ?6, ?7)",
            (&id, sender_id, receiver_id, &draft.content, &draft.kind, &draft.reply_to, now),
        )?;

        get_message_with(&conn, &id)
    }

    pub fn get_message(&self, id: &str) -> Result<Message> {
        let conn = self.conn()?;
        get_message_with(&conn, id)
    }

    /// One page of the conversation between `caller_id` and `peer_id`,
    /// oldest-first, tombstones excluded. Side effect: everything the peer
    /// sent the caller in this conversation is marked read, after the page
    /// was captured, so the returned statuses are the pre-sweep ones.
    pub fn history(
        &self,
        caller_id: &str,
        peer_id: &str,
        page: i64,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        let offset = (page - 1) * limit;

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.sender_id, m.receiver_id, m.content, m.kind, m.status,
                    m.reply_to_id, m.is_edited, m.is_deleted, m.deleted_at, m.created_at,
                    m.edited_at, s.username, s.avatar, r.username, r.avatar
             FROM messages m
             JOIN users s ON s.id = m.sender_id
             JOIN users r ON r.id = m.receiver_id
             WHERE m.is_deleted = 0
               AND ((m.sender_id = ?1 AND m.receiver_id = ?2)
                 OR (m.sender_id = ?2 AND m.receiver_id = ?1))
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![caller_id, peer_id, limit, offset],
                row_to_message,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut messages = Vec::with_capacity(rows.len());
        for (mut message, reply_id) in rows {
            if let Some(reply_id) = reply_id {
                message.reply_to = load_reply_preview(&conn, &reply_id)?;
            }
            message.reactions = load_reactions(&conn, &message.id)?;
            messages.push(message);
        }
        messages.reverse();

        conn.execute(
            "UPDATE messages SET status = 'read'
             WHERE sender_id = ?1 AND receiver_id = ?2 AND status != 'read'",
            [peer_id, caller_id],
        )?;

        Ok(messages)
    }

    /// Replace a message's content. Only the author may edit, and only
    /// within [`EDIT_WINDOW_MS`] of creation.
    pub fn edit_message(&self, id: &str, editor_id: &str, new_content: &str) -> Result<Message> {
        if new_content.is_empty() || new_content.len() > MAX_CONTENT_LENGTH {
            return Err(StoreError::Validation(
                "content length out of range".to_string(),
            ));
        }

        let conn = self.conn()?;
        let (sender_id, created_at): (String, i64) = conn
            .query_row(
                "SELECT sender_id, created_at FROM messages WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(not_found)?;
        if sender_id != editor_id {
            return Err(StoreError::Unauthorized);
        }
        let now = chrono::Utc::now().timestamp_millis();
        if now - created_at > EDIT_WINDOW_MS {
            return Err(StoreError::EditWindowExpired);
        }

        conn.execute(
            "UPDATE messages SET content = ?1, is_edited = 1, edited_at = ?2 WHERE id = ?3",
            (new_content, now, id),
        )?;
        get_message_with(&conn, id)
    }

    /// Tombstone a message: the row stays so reply references keep
    /// resolving, but the content is gone for good.
    pub fn delete_message(&self, id: &str, editor_id: &str) -> Result<Message> {
        let conn = self.conn()?;
        let sender_id: String = conn
            .query_row("SELECT sender_id FROM messages WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .map_err(not_found)?;
        if sender_id != editor_id {
            return Err(StoreError::Unauthorized);
        }

        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "UPDATE messages SET content = ?1, is_deleted = 1, deleted_at = ?2 WHERE id = ?3",
            (DELETED_MESSAGE_PLACEHOLDER, now, id),
        )?;
        get_message_with(&conn, id)
    }

    /// Upsert one user's reaction. Replacing an emoji keeps the original
    /// reaction timestamp, so the display order is stable.
    pub fn react(&self, id: &str, user_id: &str, emoji: &str) -> Result<Message> {
        if emoji.is_empty() || emoji.len() > MAX_EMOJI_LENGTH {
            return Err(StoreError::Validation(
                "emoji length out of range".to_string(),
            ));
        }

        let conn = self.conn()?;
        conn.query_row("SELECT 1 FROM messages WHERE id = ?1", [id], |_| Ok(()))
            .map_err(not_found)?;

        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO reactions (message_id, user_id, emoji, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (message_id, user_id) DO UPDATE SET emoji = excluded.emoji",
            (id, user_id, emoji, now),
        )?;
        get_message_with(&conn, id)
    }

    /// Advance `sent -> delivered`. A message already past `sent` is left
    /// alone; an unknown id is a no-op.
    pub fn mark_delivered(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE messages SET status = 'delivered' WHERE id = ?1 AND status = 'sent'",
            [id],
        )?;
        Ok(())
    }

    /// Advance to `read` from either earlier state. Never regresses.
    pub fn mark_read(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE messages SET status = 'read' WHERE id = ?1 AND status != 'read'",
            [id],
        )?;
        Ok(())
    }
}
