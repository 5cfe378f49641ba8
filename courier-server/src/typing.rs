use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::warn;

use courier_proto::WsMessage;

use crate::state::ServerState;

/// How long a typing indicator lives without being re-armed. There is no
/// explicit stop event in the protocol; expiry is the only stop signal.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// Self-expiring typing timers, keyed by the typing user.
pub struct TypingTracker {
    timers: DashMap<String, JoinHandle<()>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self {
            timers: DashMap::new(),
        }
    }

    /// Push `is_typing: true` to the receiver and arm the expiry timer for
    /// the sender. An already-armed timer is replaced, never stacked, so a
    /// burst of keystrokes produces exactly one eventual stop push.
    pub fn start(state: &Arc<ServerState>, sender_id: &str, receiver_id: &str) {
        let started = WsMessage::TypingStatus {
            user_id: sender_id.to_string(),
            is_typing: true,
        };
        match serde_json::to_string(&started) {
            Ok(json) => {
                state.presence.send_to_user(receiver_id, &json);
            }
            Err(e) => warn!("Failed to serialize typing event: {}", e),
        }

        let task_state = state.clone();
        let sender = sender_id.to_string();
        let receiver = receiver_id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(TYPING_EXPIRY).await;
            task_state.typing.timers.remove(&sender);
            let stopped = WsMessage::TypingStatus {
                user_id: sender,
                is_typing: false,
            };
            if let Ok(json) = serde_json::to_string(&stopped) {
                // The receiver is looked up again; they may be gone by now
                task_state.presence.send_to_user(&receiver, &json);
            }
        });

        if let Some(previous) = state.typing.timers.insert(sender_id.to_string(), timer) {
            previous.abort();
        }
    }

    /// Drop any armed timer without pushing a stop signal. Used when the
    /// typing user disconnects.
    pub fn clear(&self, user_id: &str) {
        if let Some((_, timer)) = self.timers.remove(user_id) {
            timer.abort();
        }
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}
