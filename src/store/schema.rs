//! Normative key schema for every record the engine persists.
//!
//! The prefixes below are frozen: changing any byte changes where every
//! record lives, so the layout carries an explicit version. All key
//! construction goes through these functions; nothing else in the crate
//! builds storage keys by hand.
//!
//! | prefix | record |
//! |--------|--------|
//! | `b/`   | bucket record, by big-endian bucket index |
//! | `t/`   | bucket digest table, by state root |
//! | `B/`   | block body, by block hash |
//! | `H/`   | block hash, by big-endian height |
//! | `Tm/`  | transaction meta, by transaction hash |
//! | `R/`   | receipt, by transaction hash |

use primitive_types::H256;

/// Version of the key layout. Bump on any change to the prefixes or the
/// suffix encodings below.
pub const SCHEMA_VERSION: u32 = 1;

/// Key of a bucket record: `b/<bucket-index-be>`.
pub fn bucket_key(index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(10);
    key.extend_from_slice(b"b/");
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// Key of a bucket digest table record: `t/<root>`.
pub fn table_key(root: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(34);
    key.extend_from_slice(b"t/");
    key.extend_from_slice(root.as_bytes());
    key
}

/// Key of a block body: `B/<hash>`.
pub fn block_key(hash: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(34);
    key.extend_from_slice(b"B/");
    key.extend_from_slice(hash.as_bytes());
    key
}

/// Key of the hash-by-height index: `H/<height-be>`.
pub fn height_key(height: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(10);
    key.extend_from_slice(b"H/");
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Key of a transaction meta record: `Tm/<tx-hash>`.
pub fn tx_meta_key(tx_hash: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(35);
    key.extend_from_slice(b"Tm/");
    key.extend_from_slice(tx_hash.as_bytes());
    key
}

/// Key of a receipt record: `R/<tx-hash>`.
pub fn receipt_key(tx_hash: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(34);
    key.extend_from_slice(b"R/");
    key.extend_from_slice(tx_hash.as_bytes());
    key
}
