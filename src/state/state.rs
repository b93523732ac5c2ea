//! Buffered world state over a bucket Merkle tree.

use std::sync::Arc;

use primitive_types::H256;

use crate::merkle::{BucketTree, Result, TreeConfig, WriteSet};
use crate::store::{Batch, KvStore};

/// World state as the executor sees it.
///
/// `put`/`delete` buffer a block's write-set; `commit` forwards the buffer
/// to the tree, seals it into the height batch, and returns the new root.
/// Reads resolve through the buffer first, then the tree (its staged
/// delta, then stored buckets).
pub struct State<S> {
    tree: BucketTree<S>,
    buffer: WriteSet,
}

impl<S: KvStore> State<S> {
    /// Creates a state bound to `store` and initializes it at `root`
    /// (`None` for a fresh, empty state).
    pub fn new(store: Arc<S>, config: TreeConfig, root: Option<H256>) -> Result<Self> {
        let mut tree = BucketTree::new(store, config);
        tree.init(root)?;
        Ok(Self {
            tree,
            buffer: WriteSet::default(),
        })
    }

    /// Buffers an insert or overwrite.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.buffer.insert(key, Some(value));
    }

    /// Buffers a deletion.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.buffer.insert(key, None);
    }

    /// Resolves `key` through the buffer, then the tree.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(update) = self.buffer.get(key) {
            return Ok(update.clone());
        }
        self.tree.get(key)
    }

    /// Seals the buffered write-set into `batch`, returning the new root.
    ///
    /// On error the caller must drop `batch` and call [`State::reload`]
    /// at the previously committed root.
    pub fn commit(&mut self, batch: &mut Batch) -> Result<H256> {
        self.tree.prepare(&self.buffer)?;
        self.buffer.clear();
        self.tree.commit(batch)
    }

    /// Returns the committed state root. Buffered writes do not affect it.
    pub fn root(&self) -> H256 {
        self.tree.hash()
    }

    /// Reinitializes the underlying tree at `root`, discarding the buffer
    /// and any staged delta. Required after a failed commit.
    pub fn reload(&mut self, root: Option<H256>) -> Result<()> {
        self.buffer.clear();
        self.tree.init(root)
    }
}
