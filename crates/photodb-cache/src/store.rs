//! Session-scoped cache registry
//!
//! Maps a row key to its on-disk cache entry. Every operation takes the one
//! internal lock, so the check-then-insert in [`CacheStore::try_begin`] is
//! linearizable across concurrent callers; this is the single mandatory
//! synchronization point of the whole cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Lifecycle state of one cache entry.
///
/// Transitions are monotonic: `Writing` moves to `Done` or `Failed` and
/// neither terminal state ever reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    Writing,
    Done,
    Failed,
}

/// Metadata for one cached photo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub state: EntryState,
    pub created_at: DateTime<Utc>,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub writers_spawned: u64,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<String, CacheEntry>,
    writers_spawned: u64,
    hits: u64,
    misses: u64,
}

/// Concurrent registry of cache entries for one session
#[derive(Default)]
pub struct CacheStore {
    inner: Mutex<StoreInner>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically insert a `Writing` entry iff no live entry exists for
    /// `key`. Returns false (and mutates nothing) when one does; the caller
    /// must not spawn a second writer in that case.
    ///
    /// A `Failed` entry counts as absent: it is replaced so the key can be
    /// retried instead of staying dead for the rest of the session.
    pub fn try_begin(&self, key: &str, path: &Path) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.entries.get(key) {
            Some(entry) if entry.state != EntryState::Failed => false,
            _ => {
                inner.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        key: key.to_string(),
                        path: path.to_path_buf(),
                        state: EntryState::Writing,
                        created_at: Utc::now(),
                    },
                );
                true
            }
        }
    }

    /// Non-blocking read of one entry.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(key).cloned()
    }

    /// Transition `Writing -> Done`. Idempotent; missing keys and entries
    /// already terminal are left alone.
    pub fn mark_done(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(key) {
            if entry.state == EntryState::Writing {
                entry.state = EntryState::Done;
            }
        }
    }

    /// Transition `Writing -> Failed`. Idempotent; never downgrades `Done`.
    pub fn mark_failed(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(key) {
            if entry.state == EntryState::Writing {
                entry.state = EntryState::Failed;
            }
        }
    }

    /// Remove and return every entry. Used by teardown.
    pub fn drain(&self) -> Vec<CacheEntry> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub fn record_hit(&self) {
        self.inner.lock().unwrap().hits += 1;
    }

    pub fn record_miss(&self) {
        self.inner.lock().unwrap().misses += 1;
    }

    pub fn record_writer_spawned(&self) {
        self.inner.lock().unwrap().writers_spawned += 1;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            entries: inner.entries.len(),
            writers_spawned: inner.writers_spawned,
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_try_begin_inserts_writing_entry() {
        let store = CacheStore::new();
        assert!(store.try_begin("1", Path::new("/cache/a.jpg")));

        let entry = store.lookup("1").unwrap();
        assert_eq!(entry.state, EntryState::Writing);
        assert_eq!(entry.path, PathBuf::from("/cache/a.jpg"));
    }

    #[test]
    fn test_try_begin_refuses_second_caller() {
        let store = CacheStore::new();
        assert!(store.try_begin("1", Path::new("/cache/a.jpg")));
        assert!(!store.try_begin("1", Path::new("/cache/a.jpg")));

        store.mark_done("1");
        assert!(!store.try_begin("1", Path::new("/cache/a.jpg")));
    }

    #[test]
    fn test_try_begin_replaces_failed_entry() {
        let store = CacheStore::new();
        assert!(store.try_begin("1", Path::new("/cache/a.jpg")));
        store.mark_failed("1");

        assert!(store.try_begin("1", Path::new("/cache/a.jpg")));
        assert_eq!(store.lookup("1").unwrap().state, EntryState::Writing);
    }

    #[test]
    fn test_try_begin_single_winner_under_contention() {
        let store = Arc::new(CacheStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store.try_begin("1", Path::new("/cache/a.jpg"))
            }));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mark_done_is_monotonic() {
        let store = CacheStore::new();
        store.try_begin("1", Path::new("/cache/a.jpg"));
        store.mark_done("1");
        store.mark_failed("1");
        assert_eq!(store.lookup("1").unwrap().state, EntryState::Done);

        // Unknown key is a no-op
        store.mark_done("99");
        assert!(store.lookup("99").is_none());
    }

    #[test]
    fn test_drain_empties_store() {
        let store = CacheStore::new();
        store.try_begin("1", Path::new("/cache/a.jpg"));
        store.try_begin("2", Path::new("/cache/b.jpg"));

        let drained = store.drain();
        assert_eq!(drained.len(), 2);
        assert!(store.is_empty());
        assert!(store.lookup("1").is_none());
    }

    #[test]
    fn test_stats_counters() {
        let store = CacheStore::new();
        store.try_begin("1", Path::new("/cache/a.jpg"));
        store.record_hit();
        store.record_hit();
        store.record_miss();
        store.record_writer_spawned();

        let stats = store.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writers_spawned, 1);
    }

    #[test]
    fn test_stats_serialization() {
        let stats = CacheStats {
            entries: 3,
            writers_spawned: 2,
            hits: 10,
            misses: 4,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("writers_spawned"));
        assert!(json.contains("10"));
    }
}
