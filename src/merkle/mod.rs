//! State root computation.
//!
//! Digest and canonical-encoding primitives plus the bucket Merkle tree
//! that turns a block's write-set into a verifiable state root.

mod bucket;
mod digest;
mod encode;
mod tree;

pub use bucket::Bucket;
pub use digest::{bucket_index, fnv1a64, sha256, DIGEST_SIZE, NIL_DIGEST};
pub use encode::{CodecError, Decoder, Encoder};
pub use tree::{BucketTree, Result, TreeConfig, TreeError, WriteSet};
