use dashmap::DashMap;
use tokio::sync::mpsc;

struct UserPresence {
    /// One sender handle per live connection (multi-device).
    handles: Vec<mpsc::UnboundedSender<String>>,
    /// False while the user reported themselves inactive.
    displayed_online: bool,
}

/// Live connection handles and displayed presence, per user.
///
/// Reachability and displayed presence are distinct: a user who sent
/// `user_inactive` still receives pushes on every handle but shows as
/// away to friends. A user is reachable while any handle is live.
pub struct PresenceRegistry {
    clients: DashMap<String, UserPresence>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Add a connection handle. A fresh connection always displays online.
    pub fn register(&self, user_id: String, tx: mpsc::UnboundedSender<String>) {
        let mut entry = self.clients.entry(user_id).or_insert_with(|| UserPresence {
            handles: Vec::new(),
            displayed_online: true,
        });
        entry.handles.push(tx);
        entry.displayed_online = true;
    }

    /// Drop one connection handle, pruning any dead ones along the way.
    /// Returns true when the user has no live handles left.
    pub fn unregister(&self, user_id: &str, handle: &mpsc::UnboundedSender<String>) -> bool {
        if let Some(mut entry) = self.clients.get_mut(user_id) {
            entry
                .handles
                .retain(|tx| !tx.same_channel(handle) && !tx.is_closed());
            let empty = entry.handles.is_empty();
            drop(entry);
            if empty {
                self.clients.remove(user_id);
            }
            empty
        } else {
            true
        }
    }

    /// Whether the user has at least one live connection.
    pub fn is_reachable(&self, user_id: &str) -> bool {
        self.clients
            .get(user_id)
            .map(|entry| !entry.handles.is_empty())
            .unwrap_or(false)
    }

    /// Whether the user is reachable and has not retracted their presence.
    pub fn displayed_online(&self, user_id: &str) -> bool {
        self.clients
            .get(user_id)
            .map(|entry| !entry.handles.is_empty() && entry.displayed_online)
            .unwrap_or(false)
    }

    pub fn mark_active(&self, user_id: &str) {
        if let Some(mut entry) = self.clients.get_mut(user_id) {
            entry.displayed_online = true;
        }
    }

    pub fn mark_inactive(&self, user_id: &str) {
        if let Some(mut entry) = self.clients.get_mut(user_id) {
            entry.displayed_online = false;
        }
    }

    /// Send a message to every connection of one user. Returns true if at
    /// least one handle accepted it.
    pub fn send_to_user(&self, user_id: &str, message: &str) -> bool {
        if let Some(entry) = self.clients.get(user_id) {
            let mut sent = false;
            for tx in entry.handles.iter() {
                if tx.send(message.to_string()).is_ok() {
                    sent = true;
                }
            }
            sent
        } else {
            false
        }
    }

    /// Fan one message out to a chosen set of users. Unreachable users are
    /// skipped silently.
    pub fn send_to_many(&self, user_ids: &[String], message: &str) {
        for user_id in user_ids {
            self.send_to_user(user_id, message);
        }
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
