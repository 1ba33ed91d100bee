use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;

use crate::cache::RecentWindowCache;
use crate::error::FeedError;
use crate::message_store::{Message, MessageStore, UserIdentity};

/// Longest accepted message text, counted in chars after trimming.
pub const MAX_TEXT_LEN: usize = 150;

/// Serves the recent message window and accepts new messages.
///
/// The initial window read goes through the single-entry cache;
/// incremental reads and writes go straight to the store, and every
/// successful write clears the cache so the next initial read is forced
/// back to the store.
pub struct FeedService {
    store: Mutex<MessageStore>,
    cache: RecentWindowCache,
    window_size: usize,
    cache_ttl: Duration,
}

impl FeedService {
    pub fn new(
        store: MessageStore,
        cache: RecentWindowCache,
        window_size: usize,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            cache,
            window_size,
            cache_ttl,
        }
    }

    /// The current recent window, ascending by id, at most
    /// `window_size` long. A live cache entry is returned as-is; on a
    /// miss the store is read and the cache repopulated.
    pub fn initial_feed(&self) -> Result<Vec<Message>, FeedError> {
        if let Some(window) = self.cache.get() {
            return Ok(window);
        }

        let newest_first = self.store().query_top_n(self.window_size)?;
        let window = ascending_by_id(newest_first);
        self.cache.put(window.clone(), self.cache_ttl);
        Ok(window)
    }

    /// Validate and persist a new message, then clear the cached
    /// window. Returns the stored message for immediate echo to the
    /// sender.
    pub fn send(&self, author_id: i64, raw_text: &str) -> Result<Message, FeedError> {
        let text = raw_text.trim();
        if text.is_empty() {
            return Err(FeedError::Validation("message must not be empty"));
        }
        if text.chars().count() > MAX_TEXT_LEN {
            return Err(FeedError::Validation("message exceeds 150 characters"));
        }

        let message = {
            let store = self.store();
            let author = store
                .find_user(author_id)?
                .ok_or(FeedError::UnknownUser(author_id))?;
            store.append_message(&author, text, Utc::now().timestamp())?
        };

        // Invalidate even when the cache was already empty; the next
        // initial feed must re-read the store.
        self.cache.invalidate();

        Ok(message)
    }

    /// Every message newer than `after_id`, ascending. Bypasses the
    /// cache: a poller must never miss an acknowledged message.
    pub fn feed_since(&self, after_id: i64) -> Result<Vec<Message>, FeedError> {
        Ok(self.store().query_after(after_id)?)
    }

    /// Find or create the user record posting under `name`.
    pub fn resolve_user(&self, raw_name: &str) -> Result<UserIdentity, FeedError> {
        let name = raw_name.trim();
        if name.is_empty() {
            return Err(FeedError::Validation("user name must not be empty"));
        }
        Ok(self.store().ensure_user(name)?)
    }

    fn store(&self) -> MutexGuard<'_, MessageStore> {
        // Store operations are transactional, so the connection behind
        // a poisoned lock is still usable.
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Top-N queries come back newest first; the feed always hands out the
/// window oldest first.
fn ascending_by_id(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by_key(|m| m.id);
    messages
}
