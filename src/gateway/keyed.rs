//! Sharded per-key state shared by the rate gate and the lockout tracker.
//!
//! Each key owns its own mutex. The shard lock is only held long enough to
//! find or insert the entry, so callers touching different identities never
//! wait on each other's read-modify-write. Entries are never removed: a reset
//! writes the default value back in place, which keeps a concurrent update
//! from landing on a record that has already been detached from the map.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

const SHARDS: usize = 16;

type Shard<T> = RwLock<HashMap<String, Arc<Mutex<T>>>>;

#[derive(Debug)]
pub struct KeyedState<T> {
    shards: Vec<Shard<T>>,
}

impl<T: Default> Default for KeyedState<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> KeyedState<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    /// Run `f` against the state for `key` while holding that key's lock.
    ///
    /// The entry is created with `T::default()` on first use. `f` must not
    /// block or await.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> R {
        let entry = self.entry(key);
        let mut state = entry.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Read the state for `key` without creating it.
    pub fn inspect<R>(&self, key: &str, f: impl FnOnce(Option<&T>) -> R) -> R {
        let existing = {
            let shard = self.shard(key).read().unwrap_or_else(PoisonError::into_inner);
            shard.get(key).cloned()
        };
        match existing {
            Some(entry) => {
                let state = entry.lock().unwrap_or_else(PoisonError::into_inner);
                f(Some(&state))
            }
            None => f(None),
        }
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: &str) -> Arc<Mutex<T>> {
        let shard = self.shard(key);
        let existing = shard
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        if let Some(entry) = existing {
            return entry;
        }

        let mut writer = shard.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            writer
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(T::default()))),
        )
    }

    fn shard(&self, key: &str) -> &Shard<T> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // Truncation is fine, only the low bits pick the shard.
        #[allow(clippy::cast_possible_truncation)]
        let index = (hasher.finish() as usize) % SHARDS;
        &self.shards[index]
    }
}
