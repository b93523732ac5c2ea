//! The bucket Merkle tree.
//!
//! Two-level hashing: state keys hash into a fixed number of buckets, each
//! bucket is digested as a unit, and a fixed-fanout aggregation above the
//! bucket digest table reduces to a single root. A write-set touching `n`
//! buckets costs `n` bucket re-hashes plus one path re-hash per
//! aggregation level, which beats a radix structure over the same key
//! universe for the small write-sets a block produces.
//!
//! The full digest table is persisted under the root it aggregates to, so
//! the root is a self-certifying version handle: `init(root)` is a single
//! point read plus a recomputation check.

use std::sync::Arc;

use hashbrown::HashMap;
use primitive_types::H256;
use rayon::prelude::*;
use rustc_hash::FxBuildHasher;
use thiserror::Error;
use tracing::debug;

use crate::store::{schema, Batch, KvStore, StoreError};

use super::bucket::Bucket;
use super::digest::{bucket_index, sha256, NIL_DIGEST};
use super::encode::{CodecError, Decoder, Encoder};

/// Type alias for our fast HashMap with FxHash.
type FastHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// A block's pending state updates: key to new value, `None` meaning
/// deletion. Callers deduplicate; within one map each key is a single
/// effective update.
pub type WriteSet = FastHashMap<Vec<u8>, Option<Vec<u8>>>;

/// Tree errors.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The persisted table record for a root is missing, malformed, or does
    /// not aggregate back to that root.
    #[error("corrupt state: table record for root {0:?} missing or inconsistent")]
    CorruptState(H256),
    /// A staged key or value is malformed. Nothing was staged.
    #[error("invalid write set: {0}")]
    InvalidWriteSet(&'static str),
    /// The tree has not been initialized with a root.
    #[error("tree is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Geometry of a tree, fixed at construction.
///
/// Both numbers are part of the on-disk format: changing either changes
/// every root ever produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeConfig {
    /// Number of buckets in the digest table.
    pub capacity: usize,
    /// Children per aggregation node.
    pub fanout: usize,
}

impl TreeConfig {
    /// Default bucket count.
    pub const DEFAULT_CAPACITY: usize = 1024;
    /// Default aggregation fanout.
    pub const DEFAULT_FANOUT: usize = 16;

    /// Creates a config with explicit geometry.
    pub fn new(capacity: usize, fanout: usize) -> Self {
        assert!(capacity >= 1, "capacity must be at least 1");
        assert!(fanout >= 2, "fanout must be at least 2");
        Self { capacity, fanout }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY, Self::DEFAULT_FANOUT)
    }
}

/// Authenticated key-value map over a bucket digest table.
///
/// Lifecycle: construct bound to a store, `init` with a nil root (fresh)
/// or a committed root (verified reload), stage updates with `prepare`,
/// seal them with `commit` into a height batch. `commit` is the only
/// mutator of observable state; staged updates never move the root.
///
/// Not safe for concurrent `prepare`/`commit`; callers serialize.
pub struct BucketTree<S> {
    store: Arc<S>,
    config: TreeConfig,
    /// Aggregation levels. `levels[0]` is the bucket digest table of
    /// `capacity` entries; each higher level is the fanout-reduction of
    /// the one below; the top level has a single node, the root.
    levels: Vec<Vec<H256>>,
    /// Lowest level whose cached digests are current. Every completed
    /// `init`/`commit` leaves the whole cache consistent, i.e. level 0.
    llevel: usize,
    /// Pending per-key updates accumulated by `prepare`.
    staged: WriteSet,
    initialized: bool,
}

impl<S: KvStore> BucketTree<S> {
    /// Creates an uninitialized tree bound to `store`.
    pub fn new(store: Arc<S>, config: TreeConfig) -> Self {
        Self {
            store,
            config,
            levels: Vec::new(),
            llevel: 0,
            staged: WriteSet::default(),
            initialized: false,
        }
    }

    /// Returns the tree geometry.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// The root of a tree with no entries: the aggregation of an all-nil
    /// digest table. Fixed for a given geometry.
    pub fn empty_root(config: &TreeConfig) -> H256 {
        let levels = build_levels(vec![NIL_DIGEST; config.capacity], config.fanout);
        top_digest(&levels)
    }

    /// Initializes the tree, discarding any staged updates.
    ///
    /// With `None` (or the nil digest) the table starts fresh, all nil.
    /// With a committed root the persisted table record is loaded and its
    /// aggregation is verified against the root; any inconsistency is
    /// [`TreeError::CorruptState`].
    pub fn init(&mut self, root: Option<H256>) -> Result<()> {
        self.staged.clear();
        self.initialized = false;

        let table = match root {
            None => vec![NIL_DIGEST; self.config.capacity],
            Some(root) if root == NIL_DIGEST => vec![NIL_DIGEST; self.config.capacity],
            Some(root) => {
                let record = self
                    .store
                    .get(&schema::table_key(&root))?
                    .ok_or(TreeError::CorruptState(root))?;
                let (table, stored_root) = decode_table(&record)
                    .map_err(|_| TreeError::CorruptState(root))?;
                if table.len() != self.config.capacity || stored_root != root {
                    return Err(TreeError::CorruptState(root));
                }
                table
            }
        };

        self.levels = build_levels(table, self.config.fanout);
        if let Some(expected) = root {
            if expected != NIL_DIGEST && top_digest(&self.levels) != expected {
                self.levels.clear();
                return Err(TreeError::CorruptState(expected));
            }
        }
        self.llevel = 0;
        self.initialized = true;
        Ok(())
    }

    /// Merges `write_set` into the staged delta.
    ///
    /// Pure with respect to observable state: no store access, no table
    /// mutation. Later writes to a key overwrite earlier staged writes.
    /// On a malformed entry nothing is staged.
    pub fn prepare(&mut self, write_set: &WriteSet) -> Result<()> {
        for key in write_set.keys() {
            if key.is_empty() {
                return Err(TreeError::InvalidWriteSet("empty key"));
            }
        }
        for (key, update) in write_set {
            self.staged.insert(key.clone(), update.clone());
        }
        Ok(())
    }

    /// Seals the staged delta into `batch` and returns the new root.
    ///
    /// Affected buckets are read from the store, rewritten (or deleted,
    /// when emptied) into the batch, re-hashed, and the aggregation paths
    /// above them recomputed. The new digest table is recorded under the
    /// new root. With nothing staged this is a no-op returning the prior
    /// root and recording no writes.
    ///
    /// On error the caller must discard `batch` and re-`init` the tree at
    /// the previously committed root before reuse.
    pub fn commit(&mut self, batch: &mut Batch) -> Result<H256> {
        if !self.initialized {
            return Err(TreeError::NotInitialized);
        }
        if self.staged.is_empty() {
            return Ok(self.hash());
        }

        // Partition the delta by bucket index
        let mut by_bucket: FastHashMap<usize, Vec<(&[u8], Option<&[u8]>)>> =
            FastHashMap::default();
        for (key, update) in &self.staged {
            by_bucket
                .entry(bucket_index(key, self.config.capacity))
                .or_default()
                .push((key.as_slice(), update.as_deref()));
        }

        let mut dirty: Vec<usize> = by_bucket.keys().copied().collect();
        dirty.sort_unstable();

        // Read-modify-write each affected bucket into the batch
        let mut updated: Vec<(usize, Bucket)> = Vec::with_capacity(dirty.len());
        for &index in &dirty {
            let key = schema::bucket_key(index as u64);
            let mut bucket = match self.store.get(&key)? {
                Some(bytes) => Bucket::decode(&bytes)?,
                None => Bucket::new(),
            };
            for (entry_key, update) in &by_bucket[&index] {
                match update {
                    Some(value) => bucket.insert(entry_key.to_vec(), value.to_vec()),
                    None => {
                        bucket.remove(entry_key);
                    }
                }
            }
            if bucket.is_empty() {
                batch.delete(key);
            } else {
                batch.put(key, bucket.encode());
            }
            updated.push((index, bucket));
        }
        drop(by_bucket);

        // Re-hash affected buckets in parallel
        let digests: Vec<(usize, H256)> = updated
            .par_iter()
            .map(|(index, bucket)| (*index, bucket.hash()))
            .collect();
        for (index, digest) in digests {
            self.levels[0][index] = digest;
        }

        self.update_paths(&dirty);
        let root = self.hash();

        // Persist the digest table under its new root
        batch.put(schema::table_key(&root), encode_table(&self.levels[0], &root));

        debug!(
            buckets = dirty.len(),
            keys = self.staged.len(),
            root = ?root,
            "sealed state delta",
        );
        self.staged.clear();
        Ok(root)
    }

    /// Returns the committed root. Staged updates do not affect it.
    pub fn hash(&self) -> H256 {
        top_digest(&self.levels)
    }

    /// Returns the bucket digest table.
    pub fn hash_table(&self) -> &[H256] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolves `key`, staged delta first, then the stored bucket.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.initialized {
            return Err(TreeError::NotInitialized);
        }
        if let Some(update) = self.staged.get(key) {
            return Ok(update.clone());
        }
        let index = bucket_index(key, self.config.capacity);
        match self.store.get(&schema::bucket_key(index as u64))? {
            Some(bytes) => Ok(Bucket::decode(&bytes)?.get(key).map(|v| v.to_vec())),
            None => Ok(None),
        }
    }

    /// Recomputes the aggregation nodes above the given leaf indices.
    fn update_paths(&mut self, dirty_leaves: &[usize]) {
        let fanout = self.config.fanout;
        let mut dirty: Vec<usize> = dirty_leaves.to_vec();

        for level in 0..self.levels.len() - 1 {
            self.llevel = level + 1;
            let mut parents: Vec<usize> = dirty.iter().map(|i| i / fanout).collect();
            parents.dedup();

            for &parent in &parents {
                let digest = node_digest(&self.levels[level], parent, fanout);
                self.levels[level + 1][parent] = digest;
            }
            dirty = parents;
        }
        // Whole cache is consistent again
        self.llevel = 0;
    }
}

/// Digest of the node at `index` in the level above `children`: the
/// concatenation of its fanout children in index order, missing children
/// encoded as the nil digest.
fn node_digest(children: &[H256], index: usize, fanout: usize) -> H256 {
    let mut enc = Encoder::with_capacity(fanout * 32);
    for child in 0..fanout {
        let pos = index * fanout + child;
        enc.write_digest(children.get(pos).unwrap_or(&NIL_DIGEST));
    }
    sha256(enc.as_bytes())
}

/// Builds every aggregation level above `table`, bottom up.
fn build_levels(table: Vec<H256>, fanout: usize) -> Vec<Vec<H256>> {
    let mut levels = vec![table];
    loop {
        let next = match levels.last() {
            Some(below) if below.len() > 1 => {
                let width = below.len().div_ceil(fanout);
                (0..width)
                    .map(|i| node_digest(below, i, fanout))
                    .collect::<Vec<H256>>()
            }
            _ => break,
        };
        levels.push(next);
    }
    levels
}

/// Returns the single top-level digest, or nil before initialization.
fn top_digest(levels: &[Vec<H256>]) -> H256 {
    levels
        .last()
        .and_then(|level| level.first())
        .copied()
        .unwrap_or(NIL_DIGEST)
}

/// Table record: entry count, the digests, then the root they aggregate
/// to. Keyed by that root in the store.
fn encode_table(table: &[H256], root: &H256) -> Vec<u8> {
    let mut enc = Encoder::with_capacity(4 + (table.len() + 1) * 32);
    enc.write_u32(table.len() as u32);
    for digest in table {
        enc.write_digest(digest);
    }
    enc.write_digest(root);
    enc.into_bytes()
}

fn decode_table(data: &[u8]) -> std::result::Result<(Vec<H256>, H256), CodecError> {
    let mut dec = Decoder::new(data);
    let count = dec.read_u32()? as usize;
    let mut table = Vec::with_capacity(count);
    for _ in 0..count {
        table.push(dec.read_digest()?);
    }
    let root = dec.read_digest()?;
    dec.finish()?;
    Ok((table, root))
}
