//! Per-key async mutexes.
//!
//! Operations on shared mutable state are serialized per affected key:
//! username for bind, unordered user pair for friend-accept, chat id for
//! message ordering. [`KeyedLocks`] hands out one mutex per key and
//! prunes entries nobody holds any more, so the map does not grow with
//! every key ever seen.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map of independently lockable keys.
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the mutex for `key`, waiting if another task holds it.
    ///
    /// The guard keeps the per-key mutex alive; entries whose mutex is
    /// held by nobody are evicted on the next `acquire` call for any key.
    pub async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            // Only the map holds idle entries; a count of one means no
            // guard and no waiter exists for that key.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry(key)
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        entry.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
