//! In-memory key-value store for testing.

use crate::backend::KeyValueStore;
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory key-value store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral sessions that don't need persistence
///
/// It also counts every write it performs, which lets tests assert that an
/// operation did not touch persistence at all.
///
/// # Example
///
/// ```rust
/// use canvas_sync_storage::{KeyValueStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.set("k", b"v1").unwrap();
/// store.update("k", &mut |old| {
///     let mut next = old.unwrap_or_default().to_vec();
///     next.extend_from_slice(b"+");
///     Some(next)
/// }).unwrap();
/// assert_eq!(store.get("k").unwrap(), Some(b"v1+".to_vec()));
/// assert_eq!(store.write_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    writes: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            writes: AtomicU64::new(0),
        }
    }

    /// Returns the number of writes performed since creation.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> Option<Vec<u8>>,
    ) -> StorageResult<bool> {
        // Held for the whole read-modify-write.
        let mut entries = self.entries.write();
        let next = f(entries.get(key).map(Vec::as_slice));
        match next {
            Some(value) => {
                entries.insert(key.to_string(), value);
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("missing").unwrap(), None);
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn memory_set_and_get() {
        let store = InMemoryStore::new();
        store.set("a", b"hello").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"hello".to_vec()));

        store.set("a", b"world").unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"world".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_update_declined_does_not_write() {
        let store = InMemoryStore::new();
        store.set("a", b"v").unwrap();

        let written = store.update("a", &mut |_| None).unwrap();
        assert!(!written);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.get("a").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn memory_update_sees_absent_value() {
        let store = InMemoryStore::new();
        let mut seen = Some(vec![0u8]);
        store
            .update("fresh", &mut |old| {
                seen = old.map(<[u8]>::to_vec);
                Some(b"init".to_vec())
            })
            .unwrap();

        assert_eq!(seen, None);
        assert_eq!(store.get("fresh").unwrap(), Some(b"init".to_vec()));
    }

    #[test]
    fn memory_concurrent_updates_are_atomic() {
        let store = Arc::new(InMemoryStore::new());
        store.set("counter", &0u64.to_le_bytes()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store
                            .update("counter", &mut |old| {
                                let mut buf = [0u8; 8];
                                buf.copy_from_slice(old.unwrap());
                                Some((u64::from_le_bytes(buf) + 1).to_le_bytes().to_vec())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut buf = [0u8; 8];
        buf.copy_from_slice(&store.get("counter").unwrap().unwrap());
        assert_eq!(u64::from_le_bytes(buf), 800);
    }

    #[test]
    fn memory_with_entries_and_keys() {
        let store = InMemoryStore::with_entries([("b", b"2".to_vec()), ("a", b"1".to_vec())]);
        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        store.clear();
        assert!(store.is_empty());
    }
}
