//! Key-value store abstraction and atomic write batches.
//!
//! The engine never talks to a storage backend directly: everything goes
//! through [`KvStore`], and all block-scoped writes are accumulated in a
//! [`Batch`] that the backend applies atomically. `MemoryStore` is the
//! reference implementation used by tests and by nodes keeping state hot.

use hashbrown::HashMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;
use thiserror::Error;

/// Type alias for our fast HashMap with FxHash.
type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend failed; the current height must not advance.
    #[error("store backend failure: {0}")]
    Backend(String),
    /// Transient I/O failure; the caller may retry the operation.
    #[error("transient i/o failure: {0}")]
    Transient(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A single operation recorded in a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite a key.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Remove a key.
    Delete { key: Vec<u8> },
}

/// An ordered, replay-safe accumulator of writes and deletes.
///
/// Ops are applied in insertion order, so a later op to the same key wins.
/// A batch holds no reference to any store; the store it is handed to
/// applies the whole sequence atomically via [`KvStore::write`].
#[derive(Clone, Debug, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Records an insert or overwrite.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { key, value });
    }

    /// Records a deletion.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { key });
    }

    /// Returns the number of recorded ops.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if no ops have been recorded.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Discards all recorded ops.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Returns the recorded ops in insertion order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// Abstract byte-oriented key-value store with atomic batch application.
///
/// Iteration is deliberately absent: every record the engine reads is
/// reachable through the key schema. Implementations must make
/// [`KvStore::write`] all-or-nothing.
pub trait KvStore: Send + Sync {
    /// Gets the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Inserts or overwrites a single key.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Deletes a single key. Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Returns true if `key` is present.
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Applies every op in `batch` atomically, in insertion order.
    fn write(&self, batch: &Batch) -> Result<()>;
}

/// In-memory store backed by a lock-guarded hash map.
///
/// Batch application holds the write lock for the whole replay, so readers
/// observe either none or all of a batch's effects.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<FastHashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(FastHashMap::with_hasher(FxBuildHasher)),
        }
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn write(&self, batch: &Batch) -> Result<()> {
        let mut data = self.data.write();
        for op in batch.ops() {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key } => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();

        store.put(b"k1", b"v1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert!(store.has(b"k1").unwrap());

        store.delete(b"k1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), None);
        assert!(!store.has(b"k1").unwrap());
    }

    #[test]
    fn test_batch_replay_order() {
        let store = MemoryStore::new();

        let mut batch = Batch::new();
        batch.put(b"k".to_vec(), b"first".to_vec());
        batch.put(b"k".to_vec(), b"second".to_vec());
        batch.delete(b"gone".to_vec());
        assert_eq!(batch.len(), 3);

        store.put(b"gone", b"x").unwrap();
        store.write(&batch).unwrap();

        // Later op to the same key wins
        assert_eq!(store.get(b"k").unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.get(b"gone").unwrap(), None);
    }

    #[test]
    fn test_batch_put_then_delete() {
        let store = MemoryStore::new();

        let mut batch = Batch::new();
        batch.put(b"k".to_vec(), b"v".to_vec());
        batch.delete(b"k".to_vec());
        store.write(&batch).unwrap();

        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let store = MemoryStore::new();
        store.put(b"k", b"v").unwrap();

        store.write(&Batch::new()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_batch_clear() {
        let mut batch = Batch::new();
        batch.put(b"k".to_vec(), b"v".to_vec());
        assert!(!batch.is_empty());

        batch.clear();
        assert!(batch.is_empty());
    }
}
