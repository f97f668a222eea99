//! TTL cache
//!
//! Small expiring map used for verified manifests and revocation
//! verdicts. Passive: entries are dropped on access or by an explicit
//! purge, so the cache owns no background timer.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// A value cached until its deadline
struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Expiring key-value cache
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a value that expires `ttl` from now.
    pub fn insert(&self, key: K, value: V, ttl: std::time::Duration) {
        let expires_at = Utc::now() + Duration::seconds(ttl.as_secs() as i64);
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(key, Entry { value, expires_at });
    }

    /// Fetch a live value; expired entries are removed on the way out.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Utc::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remove a key outright.
    pub fn remove(&self, key: &K) {
        self.entries.lock().expect("cache lock poisoned").remove(key);
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of entries, live or not yet purged.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
