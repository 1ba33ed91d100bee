use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::message_store::Message;

/// Time source for cache expiry, injectable so tests control it.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CacheEntry {
    messages: Vec<Message>,
    expires_at: Instant,
}

/// Single-entry cache for the most recent message window.
///
/// Holds at most one window at a time; `put` replaces it wholesale and
/// `get` evaluates the TTL lazily. All operations take the one entry
/// lock, so a reader observes either a full old entry or a full new
/// one, never a partial state.
pub struct RecentWindowCache {
    entry: Mutex<Option<CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl RecentWindowCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entry: Mutex::new(None),
            clock,
        }
    }

    /// The cached window, if present and unexpired. A poisoned lock
    /// counts as a miss rather than failing the read path.
    pub fn get(&self) -> Option<Vec<Message>> {
        let guard = self.entry.lock().ok()?;
        let entry = guard.as_ref()?;
        if self.clock.now() >= entry.expires_at {
            return None;
        }
        Some(entry.messages.clone())
    }

    /// Replace the entry; it expires at `now + ttl`. A zero `ttl`
    /// stores an already-expired entry, which disables caching.
    pub fn put(&self, messages: Vec<Message>, ttl: Duration) {
        let entry = CacheEntry {
            messages,
            expires_at: self.clock.now() + ttl,
        };
        *self.lock_entry() = Some(entry);
    }

    /// Drop the entry unconditionally. No-op when already empty.
    pub fn invalidate(&self) {
        *self.lock_entry() = None;
    }

    fn lock_entry(&self) -> MutexGuard<'_, Option<CacheEntry>> {
        // The entry is only ever replaced wholesale, so the value behind
        // a poisoned lock is still coherent.
        self.entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
pub(crate) struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }
}
