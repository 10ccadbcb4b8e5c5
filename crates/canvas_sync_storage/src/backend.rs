//! Key-value store trait definition.

use crate::error::StorageResult;

/// A local persistent key-value store.
///
/// Stores are **opaque byte maps**. They provide get, set and an atomic
/// read-modify-write `update`. Callers own all value interpretation - stores
/// do not understand canvas states or transactions.
///
/// # Invariants
///
/// - `get` returns exactly the bytes last written for a key
/// - `update` observes and replaces a value atomically with respect to every
///   other `set`/`update` on the same key
/// - A failed or interrupted write leaves the previous value intact
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// Returns `None` if the key has never been written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Atomically reads, transforms and writes the value under `key`.
    ///
    /// The closure receives the current value (if any). Returning `Some`
    /// writes the new value; returning `None` leaves the store untouched and
    /// performs no write at all.
    ///
    /// Returns `true` if a value was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs. On error
    /// the previous value is left in place.
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> Option<Vec<u8>>,
    ) -> StorageResult<bool>;

    /// Lists all keys currently present in the store, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn keys(&self) -> StorageResult<Vec<String>>;
}
