//! In-memory token cache.

use parking_lot::RwLock;

use super::CacheEntry;

/// Process-wide store of cached credentials.
///
/// The application creates one cache, wraps it in an `Arc`, and hands it to
/// every [`CacheDriver`](crate::CacheDriver). The store knows nothing about
/// expiry or refresh; it only keeps one entry per logical key.
///
/// # Thread Safety
///
/// Each operation takes the internal `RwLock` for its own duration only.
/// Nothing here ever calls out while holding the lock.
pub struct TokenCache {
    entries: RwLock<Vec<CacheEntry>>,
}

impl TokenCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Insert `entry`, replacing any entry with the same logical key.
    pub fn add(&self, entry: CacheEntry) {
        let key = entry.key();
        let mut entries = self.entries.write();
        match entries.iter().position(|existing| existing.key() == key) {
            Some(index) => entries[index] = entry,
            None => entries.push(entry),
        }
    }

    /// Return every entry matching `predicate`.
    ///
    /// Entries are cloned out; the payloads are shared `Arc`s.
    pub fn query<P>(&self, predicate: P) -> Vec<CacheEntry>
    where
        P: Fn(&CacheEntry) -> bool,
    {
        self.entries
            .read()
            .iter()
            .filter(|&entry| predicate(entry))
            .cloned()
            .collect()
    }

    /// Remove every entry matching `predicate`, returning how many went.
    pub fn remove<P>(&self, predicate: P) -> usize
    where
        P: Fn(&CacheEntry) -> bool,
    {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| !predicate(entry));
        before - entries.len()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("entries_count", &self.len())
            .finish()
    }
}
