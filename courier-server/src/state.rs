use crate::auth::TokenKeeper;
use crate::presence::PresenceRegistry;
use crate::store::Store;
use crate::typing::TypingTracker;

/// Everything a connection task needs, created once in `main` and handed
/// around as an `Arc`. Tests build their own with an in-memory store.
pub struct ServerState {
    pub presence: PresenceRegistry,
    pub store: Store,
    pub typing: TypingTracker,
    pub tokens: TokenKeeper,
}

impl ServerState {
    pub fn new(store: Store, tokens: TokenKeeper) -> Self {
        Self {
            presence: PresenceRegistry::new(),
            store,
            typing: TypingTracker::new(),
            tokens,
        }
    }
}
