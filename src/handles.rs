//! Handle Table
//!
//! Registry mapping opaque integer keys to live server-side resources
//! (connections, cursors, appenders). Keys come from a per-table counter,
//! strictly increase and are never handed out twice, even after release.
//!
//! Released entries are removed outright, so a lookup on a released or
//! never-issued key is a plain `None`.
//!
//! A table is owned by exactly one session loop and is not synchronized.

use std::collections::BTreeMap;

/// Key identifying a live resource to the remote caller.
pub type HandleKey = u64;

/// Generic registry keyed by a monotonic counter.
#[derive(Debug)]
pub struct HandleTable<T> {
    entries: BTreeMap<HandleKey, T>,
    next_key: HandleKey,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_key: 0,
        }
    }

    /// Register a value and return its freshly issued key.
    pub fn insert(&mut self, value: T) -> HandleKey {
        let key = self.next_key;
        self.next_key += 1;
        self.entries.insert(key, value);
        key
    }

    pub fn get(&self, key: HandleKey) -> Option<&T> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: HandleKey) -> Option<&mut T> {
        self.entries.get_mut(&key)
    }

    pub fn contains(&self, key: HandleKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Remove an entry, handing the value back to the caller for teardown.
    ///
    /// Releasing an absent key is a no-op that returns `None`.
    pub fn release(&mut self, key: HandleKey) -> Option<T> {
        self.entries.remove(&key)
    }

    /// Live entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (HandleKey, &T)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Remove and return every entry matching `pred`, in key order.
    pub fn release_where<F>(&mut self, mut pred: F) -> Vec<(HandleKey, T)>
    where
        F: FnMut(&T) -> bool,
    {
        let keys: Vec<HandleKey> = self
            .entries
            .iter()
            .filter(|(_, v)| pred(v))
            .map(|(k, _)| *k)
            .collect();
        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|v| (k, v)))
            .collect()
    }

    /// Remove every entry, in key order.
    pub fn drain(&mut self) -> Vec<(HandleKey, T)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
