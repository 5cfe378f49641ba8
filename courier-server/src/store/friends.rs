use rusqlite::OptionalExtension;

use courier_proto::UserSummary;

use crate::error::{Result, StoreError};
use crate::store::{not_found, Store};

impl Store {
    /// Record that `to_id` has a pending request from `from_id`. The row
    /// lives on the recipient side until they respond.
    pub fn send_friend_request(&self, from_id: &str, to_id: &str) -> Result<()> {
        if from_id == to_id {
            return Err(StoreError::Validation(
                "cannot send a friend request to yourself".to_string(),
            ));
        }

        let conn = self.conn()?;
        conn.query_row("SELECT 1 FROM users WHERE id = ?1", [to_id], |_| Ok(()))
            .map_err(not_found)?;

        let already_pending: Option<i32> = conn
            .query_row(
                "SELECT 1 FROM friend_links
                 WHERE user_id = ?1 AND peer_id = ?2 AND status = 'pending'",
                [to_id, from_id],
                |row| row.get(0),
            )
            .optional()?;
        if already_pending.is_some() {
            return Err(StoreError::Validation(
                "friend request already sent".to_string(),
            ));
        }

        let already_friends: Option<i32> = conn
            .query_row(
                "SELECT 1 FROM friend_links
                 WHERE user_id = ?1 AND peer_id = ?2 AND status = 'accepted'",
                [from_id, to_id],
                |row| row.get(0),
            )
            .optional()?;
        if already_friends.is_some() {
            return Err(StoreError::Validation("already friends".to_string()));
        }

        conn.execute(
            "INSERT INTO friend_links (user_id, peer_id, status, created_at)
             VALUES (?1, ?2, 'pending', ?3)",
            (to_id, from_id, chrono::Utc::now().timestamp_millis()),
        )?;
        Ok(())
    }

    /// Resolve the pending request `from_id -> user_id`. Accepting upgrades
    /// the recipient-side row and inserts the mirror row in one transaction,
    /// so a crash cannot leave a one-sided friendship.
    pub fn respond_to_request(&self, user_id: &str, from_id: &str, accept: bool) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = if accept {
            let upgraded = tx.execute(
                "UPDATE friend_links SET status = 'accepted'
                 WHERE user_id = ?1 AND peer_id = ?2 AND status = 'pending'",
                [user_id, from_id],
            )?;
            if upgraded > 0 {
                tx.execute(
                    "INSERT INTO friend_links (user_id, peer_id, status, created_at)
                     VALUES (?1, ?2, 'accepted', ?3)
                     ON CONFLICT (user_id, peer_id) DO UPDATE SET status = 'accepted'",
                    (from_id, user_id, chrono::Utc::now().timestamp_millis()),
                )?;
            }
            upgraded
        } else {
            tx.execute(
                "DELETE FROM friend_links
                 WHERE user_id = ?1 AND peer_id = ?2 AND status = 'pending'",
                [user_id, from_id],
            )?
        };

        tx.commit()?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Sever a friendship. Both directions go in a single statement.
    pub fn remove_friend(&self, user_id: &str, peer_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM friend_links
             WHERE (user_id = ?1 AND peer_id = ?2) OR (user_id = ?2 AND peer_id = ?1)",
            [user_id, peer_id],
        )?;
        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Ids of everyone `user_id` is friends with. This is the fan-out set
    /// for presence broadcasts.
    pub fn friends_of(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT peer_id FROM friend_links WHERE user_id = ?1 AND status = 'accepted'",
        )?;
        let friends = stmt
            .query_map([user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(friends)
    }

    /// Who is waiting on an answer from `user_id`, oldest request first.
    pub fn pending_requests(&self, user_id: &str) -> Result<Vec<UserSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username, u.avatar
             FROM friend_links fl
             JOIN users u ON u.id = fl.peer_id
             WHERE fl.user_id = ?1 AND fl.status = 'pending'
             ORDER BY fl.created_at ASC",
        )?;
        let requests = stmt
            .query_map([user_id], |row| {
                Ok(UserSummary {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    avatar: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UserRecord;

    fn seed() -> (Store, UserRecord, UserRecord) {
        let store = Store::open_in_memory().unwrap();
        let alice = store.create_user("alice").unwrap();
        let bob = store.create_user("bob").unwrap();
        (store, alice, bob)
    }

    #[test]
    fn test_request_lands_on_recipient_side() {
        let (store, alice, bob) = seed();
        store.send_friend_request(&alice.id, &bob.id).unwrap();

        let pending = store.pending_requests(&bob.id).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].username, "alice");

        assert!(store.pending_requests(&alice.id).unwrap().is_empty());
        assert!(store.friends_of(&alice.id).unwrap().is_empty());
    }

    #[test]
    fn test_self_request_rejected() {
        let (store, alice, _) = seed();
        assert!(matches!(
            store.send_friend_request(&alice.id, &alice.id),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_request_to_unknown_user() {
        let (store, alice, _) = seed();
        assert!(matches!(
            store.send_friend_request(&alice.id, "missing"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let (store, alice, bob) = seed();
        store.send_friend_request(&alice.id, &bob.id).unwrap();
        assert!(matches!(
            store.send_friend_request(&alice.id, &bob.id),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_request_between_friends_rejected() {
        let (store, alice, bob) = seed();
        store.send_friend_request(&alice.id, &bob.id).unwrap();
        store.respond_to_request(&bob.id, &alice.id, true).unwrap();

        assert!(matches!(
            store.send_friend_request(&alice.id, &bob.id),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_accept_links_both_sides() {
        let (store, alice, bob) = seed();
        store.send_friend_request(&alice.id, &bob.id).unwrap();
        store.respond_to_request(&bob.id, &alice.id, true).unwrap();

        assert_eq!(store.friends_of(&alice.id).unwrap(), vec![bob.id.clone()]);
        assert_eq!(store.friends_of(&bob.id).unwrap(), vec![alice.id.clone()]);
        assert!(store.pending_requests(&bob.id).unwrap().is_empty());
    }

    #[test]
    fn test_reject_drops_the_request() {
        let (store, alice, bob) = seed();
        store.send_friend_request(&alice.id, &bob.id).unwrap();
        store.respond_to_request(&bob.id, &alice.id, false).unwrap();

        assert!(store.pending_requests(&bob.id).unwrap().is_empty());
        assert!(store.friends_of(&bob.id).unwrap().is_empty());

        // A fresh request is allowed after a rejection
        store.send_friend_request(&alice.id, &bob.id).unwrap();
    }

    #[test]
    fn test_respond_without_request_not_found() {
        let (store, alice, bob) = seed();
        assert!(matches!(
            store.respond_to_request(&bob.id, &alice.id, true),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_mutual_requests_converge_on_accept() {
        let (store, alice, bob) = seed();
        store.send_friend_request(&alice.id, &bob.id).unwrap();
        store.send_friend_request(&bob.id, &alice.id).unwrap();

        store.respond_to_request(&bob.id, &alice.id, true).unwrap();

        assert_eq!(store.friends_of(&alice.id).unwrap(), vec![bob.id.clone()]);
        assert_eq!(store.friends_of(&bob.id).unwrap(), vec![alice.id.clone()]);
    }

    #[test]
    fn test_remove_friend_clears_both_directions() {
        let (store, alice, bob) = seed();
        store.send_friend_request(&alice.id, &bob.id).unwrap();
        store.respond_to_request(&bob.id, &alice.id, true).unwrap();

        store.remove_friend(&alice.id, &bob.id).unwrap();
        assert!(store.friends_of(&alice.id).unwrap().is_empty());
        assert!(store.friends_of(&bob.id).unwrap().is_empty());
    }

    #[test]
    fn test_remove_missing_friendship_not_found() {
        let (store, alice, bob) = seed();
        assert!(matches!(
            store.remove_friend(&alice.id, &bob.id),
            Err(StoreError::NotFound)
        ));
    }
}
